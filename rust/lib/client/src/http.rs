//! Authenticated HTTP access to the CRM API.
//!
//! Every request carries the stored bearer token and organization header.
//! A 401 triggers one refresh-token exchange and one retry; concurrent
//! 401s share a single exchange.

use std::path::Path;
use std::sync::Arc;

use reqwest::header::HeaderValue;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crm_core::ClientConfig;

use crate::error::ApiError;
use crate::session::Session;

/// Header scoping a request to a tenant.
pub const ORG_HEADER: &str = "org";

// ── Login redirect ──────────────────────────────────────────────────

/// Called once the session has been cleared after a failed refresh.
/// The UI boundary uses it to send the user back to login.
pub trait LoginRedirect: Send + Sync + 'static {
    fn redirect_to_login(&self, reason: &str);
}

/// Does nothing; the caller still receives `SessionExpired`.
pub struct NoRedirect;

impl LoginRedirect for NoRedirect {
    fn redirect_to_login(&self, _reason: &str) {}
}

// ── Requests ────────────────────────────────────────────────────────

/// A file to send as one multipart part.
#[derive(Debug, Clone, PartialEq)]
pub struct FileUpload {
    pub field: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub mime: Option<String>,
}

impl FileUpload {
    pub fn new(field: impl Into<String>, file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            field: field.into(),
            file_name: file_name.into(),
            bytes,
            mime: None,
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    /// Read a file from disk; the part is named after the file.
    pub async fn from_path(field: impl Into<String>, path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self::new(field, file_name, bytes))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormPart {
    Text { name: String, value: String },
    File(FileUpload),
}

/// Request body, kept as data so a retry re-sends exactly the same thing.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Multipart(Vec<FormPart>),
}

/// Description of one API call, relative to the configured base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
    /// Sent without credentials and never refreshed (login, refresh).
    pub anonymous: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
            anonymous: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, pairs: Vec<(String, String)>) -> Self {
        self.query.extend(pairs);
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn multipart(mut self, parts: Vec<FormPart>) -> Self {
        self.body = RequestBody::Multipart(parts);
        self
    }

    pub fn anonymous(mut self) -> Self {
        self.anonymous = true;
        self
    }
}

#[derive(Deserialize)]
struct RefreshResponse {
    #[serde(alias = "access_token")]
    access: String,
}

// ── ApiClient ───────────────────────────────────────────────────────

/// HTTP client wrapper shared by every resource service.
pub struct ApiClient {
    http: reqwest::Client,
    config: ClientConfig,
    session: Arc<Session>,
    redirect: Arc<dyn LoginRedirect>,
    /// Held while a refresh is in flight; waiters re-check the stored
    /// token before refreshing again.
    refresh_gate: Mutex<()>,
}

impl ApiClient {
    pub fn new(config: ClientConfig, session: Arc<Session>) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
            config,
            session,
            redirect: Arc::new(NoRedirect),
            refresh_gate: Mutex::new(()),
        })
    }

    pub fn with_redirect(mut self, redirect: Arc<dyn LoginRedirect>) -> Self {
        self.redirect = redirect;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Send and decode a JSON body.
    pub async fn json<R: DeserializeOwned>(&self, req: &ApiRequest) -> Result<R, ApiError> {
        decode(self.value(req).await?, &req.path)
    }

    /// Send and return the raw JSON body; an empty body is `null`.
    pub async fn value(&self, req: &ApiRequest) -> Result<Value, ApiError> {
        read_json(self.execute(req).await?, &req.path).await
    }

    /// Send and discard the body.
    pub async fn send(&self, req: &ApiRequest) -> Result<(), ApiError> {
        self.execute(req).await.map(drop)
    }

    /// Issue the request; on 401, refresh once and retry once.
    async fn execute(&self, req: &ApiRequest) -> Result<reqwest::Response, ApiError> {
        if req.anonymous {
            let resp = self.dispatch(req, None).await?;
            return check(resp).await;
        }

        let sent_with = self.session.access_token();
        let resp = self.dispatch(req, sent_with.as_deref()).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return check(resp).await;
        }

        debug!(method = %req.method, path = %req.path, "401, refreshing access token");
        let fresh = self.refreshed_token(sent_with.as_deref()).await?;

        // The retry is final: a second 401 goes back to the caller.
        let retry = self.dispatch(req, Some(&fresh)).await?;
        check(retry).await
    }

    /// A usable access token newer than `stale`, refreshing at most once
    /// across concurrent callers.
    async fn refreshed_token(&self, stale: Option<&str>) -> Result<String, ApiError> {
        let _gate = self.refresh_gate.lock().await;

        match self.session.access_token() {
            Some(current) if Some(current.as_str()) != stale => {
                debug!("access token already refreshed by a concurrent request");
                return Ok(current);
            }
            None if stale.is_some() => {
                return Err(ApiError::SessionExpired(
                    "session was cleared by a failed refresh".into(),
                ));
            }
            _ => {}
        }

        match self.exchange_refresh_token().await {
            Ok(access) => {
                self.session.store_access_token(&access)?;
                info!("access token refreshed");
                Ok(access)
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed, clearing session");
                if let Err(clear_err) = self.session.expire() {
                    warn!(error = %clear_err, "failed to clear persisted session");
                }
                let reason = e.to_string();
                self.redirect.redirect_to_login(&reason);
                Err(ApiError::SessionExpired(reason))
            }
        }
    }

    /// POST the refresh token. The exchange goes straight to the wire and
    /// never re-enters the 401 handler: a rejected refresh token is final.
    async fn exchange_refresh_token(&self) -> Result<String, ApiError> {
        let refresh = self
            .session
            .refresh_token()
            .ok_or_else(|| ApiError::Auth("no refresh token stored".into()))?;

        let req = ApiRequest::post(self.config.refresh_path.clone())
            .json(serde_json::json!({ "refresh": refresh }))
            .anonymous();
        let resp = check(self.dispatch(&req, None).await?).await?;
        let resp: RefreshResponse = decode(read_json(resp, &req.path).await?, &req.path)?;
        if resp.access.is_empty() {
            return Err(ApiError::Auth("refresh returned an empty access token".into()));
        }
        Ok(resp.access)
    }

    async fn dispatch(&self, req: &ApiRequest, token: Option<&str>) -> Result<reqwest::Response, ApiError> {
        let url = self.config.endpoint(&req.path);
        let mut builder = self.http.request(req.method.clone(), &url);

        if !req.query.is_empty() {
            builder = builder.query(&req.query);
        }
        if !req.anonymous {
            if let Some(token) = token {
                builder = builder.bearer_auth(token);
            }
            if let Some(org) = self.session.org_id() {
                let value = HeaderValue::from_str(&org)
                    .map_err(|e| ApiError::Storage(format!("unusable org id {:?}: {}", org, e)))?;
                builder = builder.header(ORG_HEADER, value);
            }
        }
        builder = match &req.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(body),
            RequestBody::Multipart(parts) => builder.multipart(build_form(parts)?),
        };

        let resp = builder.send().await?;
        debug!(
            method = %req.method,
            path = %req.path,
            status = resp.status().as_u16(),
            "api response"
        );
        Ok(resp)
    }
}

fn build_form(parts: &[FormPart]) -> Result<reqwest::multipart::Form, ApiError> {
    let mut form = reqwest::multipart::Form::new();
    for part in parts {
        form = match part {
            FormPart::Text { name, value } => form.text(name.clone(), value.clone()),
            FormPart::File(file) => {
                let mut p = reqwest::multipart::Part::bytes(file.bytes.clone())
                    .file_name(file.file_name.clone());
                if let Some(mime) = &file.mime {
                    p = p.mime_str(mime)?;
                }
                form.part(file.field.clone(), p)
            }
        };
    }
    Ok(form)
}

/// Read a JSON body; an empty body is `null`.
async fn read_json(resp: reqwest::Response, path: &str) -> Result<Value, ApiError> {
    let bytes = resp.bytes().await?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(format!("{}: {}", path, e)))
}

fn decode<R: DeserializeOwned>(value: Value, path: &str) -> Result<R, ApiError> {
    if value.is_null() {
        return Err(ApiError::Decode(format!("{}: empty response body", path)));
    }
    serde_json::from_value(value).map_err(|e| ApiError::Decode(format!("{}: {}", path, e)))
}

/// Pass 2xx through, map everything else to `ApiError`.
async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ApiError::from_response(status.as_u16(), &body))
}
