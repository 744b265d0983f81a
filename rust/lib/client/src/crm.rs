//! Entry point wiring config, storage, session and services together.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crm_core::{ClientConfig, ListQuery, Page};

use crate::envelope;
use crate::error::ApiError;
use crate::http::{ApiClient, ApiRequest, LoginRedirect};
use crate::models::{
    Account, Case, Contact, Document, Event, Invoice, Lead, Opportunity, Organization,
    PlannerEvent, Task, Team, UserProfile,
};
use crate::resource::{Resource, ResourceClient};
use crate::session::{Credentials, Session, SessionState};
use crate::storage::SessionStorage;

/// Global search hits, keyed by the resource they came from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults(pub BTreeMap<String, Vec<Value>>);

impl SearchResults {
    pub fn get(&self, resource: &str) -> &[Value] {
        self.0.get(resource).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn total(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Handle to one backend, for one session.
#[derive(Clone)]
pub struct Crm {
    api: Arc<ApiClient>,
}

macro_rules! services {
    ($($method:ident => $ty:ty),* $(,)?) => {
        $(
            pub fn $method(&self) -> ResourceClient<$ty> {
                self.resource::<$ty>()
            }
        )*
    };
}

impl Crm {
    /// Build a client over `storage` and load whatever session it holds.
    pub fn new(config: ClientConfig, storage: Arc<dyn SessionStorage>) -> Result<Self, ApiError> {
        let session = Arc::new(Session::new(storage));
        session.init();
        let api = ApiClient::new(config, session)?;
        Ok(Self::from_client(api))
    }

    pub fn from_client(api: ApiClient) -> Self {
        Self { api: Arc::new(api) }
    }

    /// Like [`new`](Self::new), with a login redirect hook.
    pub fn with_redirect(
        config: ClientConfig,
        storage: Arc<dyn SessionStorage>,
        redirect: Arc<dyn LoginRedirect>,
    ) -> Result<Self, ApiError> {
        let session = Arc::new(Session::new(storage));
        session.init();
        let api = ApiClient::new(config, session)?.with_redirect(redirect);
        Ok(Self::from_client(api))
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    pub fn session(&self) -> &Arc<Session> {
        self.api.session()
    }

    pub fn resource<T: Resource>(&self) -> ResourceClient<T> {
        ResourceClient::new(self.api.clone())
    }

    services! {
        leads => Lead,
        accounts => Account,
        contacts => Contact,
        opportunities => Opportunity,
        tasks => Task,
        events => Event,
        cases => Case,
        teams => Team,
        documents => Document,
        invoices => Invoice,
        planner => PlannerEvent,
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<SessionState, ApiError> {
        self.session().login(&self.api, credentials).await
    }

    pub fn logout(&self) -> Result<(), ApiError> {
        Ok(self.session().logout()?)
    }

    /// Fetch the signed-in profile and remember it in the session.
    pub async fn profile(&self) -> Result<UserProfile, ApiError> {
        let raw = self.api.value(&ApiRequest::get("profile/")).await?;
        let inner = ["user_obj", "profile"]
            .iter()
            .find_map(|key| raw.get(*key).filter(|v| v.is_object()))
            .cloned()
            .unwrap_or(raw);
        let profile: UserProfile =
            serde_json::from_value(inner).map_err(|e| ApiError::Decode(format!("profile/: {}", e)))?;
        self.session().set_profile(&profile)?;
        Ok(profile)
    }

    /// Organizations the user belongs to. Membership rows that wrap the
    /// organization under `org` are unwrapped.
    pub async fn organizations(&self) -> Result<Vec<Organization>, ApiError> {
        let raw = self.api.value(&ApiRequest::get("org/")).await?;
        let page = envelope::normalize("org", &raw);
        let orgs = page
            .results
            .into_iter()
            .filter_map(|row| {
                let row = match row.get("org") {
                    Some(org) if org.is_object() => org.clone(),
                    _ => row,
                };
                serde_json::from_value(row)
                    .map_err(|e| debug!(error = %e, "skipping unreadable organization"))
                    .ok()
            })
            .collect();
        Ok(orgs)
    }

    pub async fn users(&self, query: &ListQuery) -> Result<Page<UserProfile>, ApiError> {
        self.resource::<UserProfile>().list(query).await
    }

    /// Global search across resources.
    pub async fn search(&self, text: &str) -> Result<SearchResults, ApiError> {
        let query = ListQuery::new().search(text);
        let raw = self
            .api
            .value(&ApiRequest::get("search/").query(query.to_pairs()))
            .await?;
        Ok(search_results(raw))
    }
}

impl fmt::Debug for Crm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crm")
            .field("base_url", &self.api.config().base_url)
            .field("session", self.session())
            .finish()
    }
}

/// Every top-level array in the response is one resource's hits; a bare
/// array or standard page is filed under `results`.
fn search_results(raw: Value) -> SearchResults {
    let mut hits = BTreeMap::new();
    match raw {
        Value::Array(rows) => {
            hits.insert("results".to_string(), rows);
        }
        Value::Object(obj) => {
            for (key, value) in obj {
                if let Value::Array(rows) = value {
                    if !rows.is_empty() {
                        hits.insert(key, rows);
                    }
                }
            }
        }
        _ => {}
    }
    SearchResults(hits)
}
