//! Session store: who is signed in, for which organization.
//!
//! One `Session` is built at startup and shared by the [`ApiClient`] and
//! the UI. Tokens live in [`SessionStorage`]; the in-memory
//! [`SessionState`] mirrors what the UI needs for routing decisions.

use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crm_core::Id;

use crate::error::ApiError;
use crate::http::{ApiClient, ApiRequest};
use crate::models::UserProfile;
use crate::storage::{keys, MemoryStorage, SessionStorage, StorageError};

/// Snapshot of the session for UI decisions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub user: Option<UserProfile>,
    pub org: Option<String>,
    pub is_authenticated: bool,
    /// False until [`Session::init`] ran; guards show a loading state.
    pub is_initialized: bool,
}

/// Login credentials.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(alias = "access")]
    access_token: String,
    #[serde(alias = "refresh", default)]
    refresh_token: Option<String>,
    #[serde(default)]
    user: Option<UserProfile>,
    #[serde(alias = "org_id", default)]
    org: Option<Id>,
}

pub struct Session {
    storage: Arc<dyn SessionStorage>,
    state: RwLock<SessionState>,
}

impl Session {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self {
            storage,
            state: RwLock::new(SessionState::default()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Load persisted state. Safe to call again; it re-reads storage.
    pub fn init(&self) -> SessionState {
        let user = self.storage.get(keys::USER).and_then(|raw| {
            serde_json::from_str::<UserProfile>(&raw)
                .map_err(|e| warn!(error = %e, "ignoring unreadable stored user"))
                .ok()
        });
        let state = SessionState {
            user,
            org: self.org_id(),
            is_authenticated: self.access_token().is_some(),
            is_initialized: true,
        };
        *self.state.write().unwrap() = state.clone();
        state
    }

    pub fn state(&self) -> SessionState {
        self.state.read().unwrap().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.read().unwrap().is_authenticated
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().unwrap().is_initialized
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.state.read().unwrap().user.clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.read(keys::ACCESS_TOKEN)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read(keys::REFRESH_TOKEN)
    }

    pub fn org_id(&self) -> Option<String> {
        self.read(keys::ORG_ID)
    }

    pub fn profile_id(&self) -> Option<String> {
        self.read(keys::PROFILE_ID)
    }

    pub fn theme(&self) -> Option<String> {
        self.read(keys::THEME)
    }

    pub fn set_theme(&self, blob: &str) -> Result<(), StorageError> {
        self.storage.set(keys::THEME, blob)
    }

    fn read(&self, key: &str) -> Option<String> {
        self.storage.get(key).filter(|v| !v.is_empty())
    }

    /// Persist a token pair obtained elsewhere (e.g. from a prior login).
    pub fn store_tokens(&self, access: &str, refresh: Option<&str>) -> Result<(), StorageError> {
        self.storage.set(keys::ACCESS_TOKEN, access)?;
        if let Some(refresh) = refresh {
            self.storage.set(keys::REFRESH_TOKEN, refresh)?;
        }
        self.state.write().unwrap().is_authenticated = true;
        Ok(())
    }

    pub(crate) fn store_access_token(&self, access: &str) -> Result<(), StorageError> {
        self.storage.set(keys::ACCESS_TOKEN, access)
    }

    /// Switch tenant. Later requests carry the new `org` header.
    pub fn select_org(&self, org_id: &str) -> Result<(), StorageError> {
        self.storage.set(keys::ORG_ID, org_id)?;
        self.state.write().unwrap().org = Some(org_id.to_string());
        Ok(())
    }

    /// Remember the signed-in profile; its id becomes the default assignee.
    pub fn set_profile(&self, profile: &UserProfile) -> Result<(), StorageError> {
        let raw = serde_json::to_string(profile).map_err(|e| StorageError::Format(e.to_string()))?;
        self.storage.set(keys::USER, &raw)?;
        if let Some(id) = &profile.id {
            self.storage.set(keys::PROFILE_ID, &id.to_string())?;
        }
        self.state.write().unwrap().user = Some(profile.clone());
        Ok(())
    }

    /// Authenticate against the backend and persist the result.
    pub async fn login(&self, api: &ApiClient, credentials: &Credentials) -> Result<SessionState, ApiError> {
        let body = serde_json::to_value(credentials).map_err(|e| ApiError::Decode(e.to_string()))?;
        let req = ApiRequest::post(api.config().login_path.clone())
            .json(body)
            .anonymous();

        let resp: LoginResponse = match api.json(&req).await {
            Ok(resp) => resp,
            Err(e @ (ApiError::Network(_) | ApiError::Decode(_))) => return Err(e),
            Err(e) => return Err(ApiError::Auth(format!("login failed: {}", e))),
        };

        // Nothing from a previous login survives: its profile id would
        // become the default assignee of the new user's records.
        self.storage.remove_all(keys::SESSION)?;
        self.storage.set(keys::ACCESS_TOKEN, &resp.access_token)?;
        if let Some(refresh) = resp.refresh_token.as_deref() {
            self.storage.set(keys::REFRESH_TOKEN, refresh)?;
        }
        if let Some(org) = &resp.org {
            self.storage.set(keys::ORG_ID, &org.to_string())?;
        }
        if let Some(user) = &resp.user {
            self.set_profile(user)?;
        }

        let state = {
            let mut state = self.state.write().unwrap();
            state.user = resp.user;
            state.org = self.org_id();
            state.is_authenticated = true;
            state.is_initialized = true;
            state.clone()
        };
        info!(email = %credentials.email, "logged in");
        Ok(state)
    }

    /// Clear persisted session state. The session stays initialized so
    /// guards redirect to login instead of showing a loading state.
    pub fn logout(&self) -> Result<(), StorageError> {
        self.clear()?;
        info!("logged out");
        Ok(())
    }

    /// Same as logout, after the refresh token was rejected.
    pub(crate) fn expire(&self) -> Result<(), StorageError> {
        self.clear()
    }

    fn clear(&self) -> Result<(), StorageError> {
        // In-memory state first: even if storage fails, nothing downstream
        // keeps treating the session as live.
        {
            let mut state = self.state.write().unwrap();
            state.user = None;
            state.org = None;
            state.is_authenticated = false;
            state.is_initialized = true;
        }
        self.storage.remove_all(keys::SESSION)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("state", &self.state()).finish()
    }
}
