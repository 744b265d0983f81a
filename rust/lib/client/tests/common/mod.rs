//! In-process mock of the CRM backend.
//!
//! Serves `/api/...` on a random local port with just enough behavior to
//! drive the client over real HTTP: bearer checking, a refresh endpoint,
//! per-resource list bodies, validation errors, and delete bookkeeping.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crm_client::{ClientConfig, Crm, LoginRedirect, MemoryStorage};

pub const EMAIL: &str = "alice@example.com";
pub const PASSWORD: &str = "secret";
pub const ACCESS_1: &str = "access-1";
pub const ACCESS_2: &str = "access-2";
pub const REFRESH_1: &str = "refresh-1";

/// A second account whose login response carries no user or org.
pub const BOB_EMAIL: &str = "bob@example.com";
pub const BOB_PASSWORD: &str = "hunter2";

#[derive(Default)]
pub struct MockState {
    pub valid_token: Mutex<String>,
    pub refresh_ok: AtomicBool,
    pub refresh_hits: AtomicUsize,
    pub protected_hits: AtomicUsize,
    pub auth_headers: Mutex<Vec<Option<String>>>,
    pub org_headers: Mutex<Vec<Option<String>>>,
    pub bodies: Mutex<Vec<Value>>,
    pub queries: Mutex<Vec<BTreeMap<String, String>>>,
    pub list_bodies: Mutex<BTreeMap<String, Value>>,
    pub deleted: Mutex<BTreeSet<String>>,
    pub uploads: Mutex<Vec<(String, String)>>,
}

impl MockState {
    pub fn set_list(&self, resource: &str, body: Value) {
        self.list_bodies.lock().unwrap().insert(resource.to_string(), body);
    }

    pub fn last_body(&self) -> Value {
        self.bodies.lock().unwrap().last().cloned().unwrap_or(Value::Null)
    }

    pub fn auth_headers(&self) -> Vec<Option<String>> {
        self.auth_headers.lock().unwrap().clone()
    }

    pub fn org_headers(&self) -> Vec<Option<String>> {
        self.org_headers.lock().unwrap().clone()
    }

    pub fn refresh_hits(&self) -> usize {
        self.refresh_hits.load(Ordering::SeqCst)
    }

    pub fn protected_hits(&self) -> usize {
        self.protected_hits.load(Ordering::SeqCst)
    }
}

pub struct MockServer {
    pub base_url: String,
    pub state: Arc<MockState>,
}

impl MockServer {
    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(self.base_url.clone())
    }

    /// Client over in-memory storage seeded with `values`.
    pub fn client(&self, values: &[(&str, &str)]) -> (Arc<MemoryStorage>, Crm) {
        let storage = Arc::new(MemoryStorage::with_values(values.iter().copied()));
        let crm = Crm::new(self.config(), storage.clone()).unwrap();
        (storage, crm)
    }

    pub fn client_with_redirect(
        &self,
        values: &[(&str, &str)],
        redirect: Arc<dyn LoginRedirect>,
    ) -> (Arc<MemoryStorage>, Crm) {
        let storage = Arc::new(MemoryStorage::with_values(values.iter().copied()));
        let crm = Crm::with_redirect(self.config(), storage.clone(), redirect).unwrap();
        (storage, crm)
    }
}

/// Records every redirect to login.
#[derive(Default)]
pub struct RecordingRedirect {
    pub reasons: Mutex<Vec<String>>,
}

impl LoginRedirect for RecordingRedirect {
    fn redirect_to_login(&self, reason: &str) {
        self.reasons.lock().unwrap().push(reason.to_string());
    }
}

pub async fn start_mock_server() -> MockServer {
    let state = Arc::new(MockState::default());
    *state.valid_token.lock().unwrap() = ACCESS_1.to_string();
    state.refresh_ok.store(true, Ordering::SeqCst);

    let app = Router::new()
        .route("/api/auth/login/", post(login))
        .route("/api/auth/refresh-token/", post(refresh))
        .route("/api/locked/", get(locked))
        .route("/api/profile/", get(profile))
        .route("/api/:resource/", get(list).post(create))
        .route(
            "/api/:resource/:id/",
            get(fetch).put(replace).patch(replace).delete(remove),
        )
        .route("/api/:resource/:id/comment/", post(comment))
        .route("/api/:resource/:id/attachment/", post(attachment))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockServer {
        base_url: format!("http://{}/api/", addr),
        state,
    }
}

type Shared = State<Arc<MockState>>;

fn error(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Record the credentials a request carried and check the bearer token.
fn authorize(state: &MockState, headers: &HeaderMap) -> Result<(), Response> {
    state.protected_hits.fetch_add(1, Ordering::SeqCst);
    let auth = header(headers, "authorization");
    state.auth_headers.lock().unwrap().push(auth.clone());
    state.org_headers.lock().unwrap().push(header(headers, "org"));

    let expected = format!("Bearer {}", state.valid_token.lock().unwrap());
    if auth.as_deref() == Some(expected.as_str()) {
        Ok(())
    } else {
        Err(error(
            StatusCode::UNAUTHORIZED,
            json!({"detail": "Given token not valid for any token type"}),
        ))
    }
}

async fn login(Json(body): Json<Value>) -> Response {
    if body["email"] == BOB_EMAIL && body["password"] == BOB_PASSWORD {
        return Json(json!({"access": ACCESS_1, "refresh": REFRESH_1})).into_response();
    }
    if body["email"] == EMAIL && body["password"] == PASSWORD {
        Json(json!({
            "access_token": ACCESS_1,
            "refresh_token": REFRESH_1,
            "user": {"id": 7, "email": EMAIL, "first_name": "Alice"},
            "org": 3,
        }))
        .into_response()
    } else {
        error(
            StatusCode::UNAUTHORIZED,
            json!({"detail": "No active account found with the given credentials"}),
        )
    }
}

async fn refresh(State(state): Shared, Json(body): Json<Value>) -> Response {
    state.refresh_hits.fetch_add(1, Ordering::SeqCst);
    if state.refresh_ok.load(Ordering::SeqCst) && body["refresh"] == REFRESH_1 {
        *state.valid_token.lock().unwrap() = ACCESS_2.to_string();
        Json(json!({"access": ACCESS_2})).into_response()
    } else {
        error(
            StatusCode::UNAUTHORIZED,
            json!({"detail": "Token is invalid or expired", "code": "token_not_valid"}),
        )
    }
}

async fn locked(State(state): Shared, headers: HeaderMap) -> Response {
    state.protected_hits.fetch_add(1, Ordering::SeqCst);
    state
        .auth_headers
        .lock()
        .unwrap()
        .push(header(&headers, "authorization"));
    error(StatusCode::UNAUTHORIZED, json!({"detail": "locked"}))
}

async fn profile(State(state): Shared, headers: HeaderMap) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    Json(json!({"user_obj": {"id": 7, "email": EMAIL, "role": "ADMIN"}})).into_response()
}

async fn list(
    State(state): Shared,
    Path(resource): Path<String>,
    Query(query): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    state.queries.lock().unwrap().push(query);
    let body = state
        .list_bodies
        .lock()
        .unwrap()
        .get(&resource)
        .cloned()
        .unwrap_or_else(|| json!({}));
    Json(body).into_response()
}

async fn create(
    State(state): Shared,
    Path(resource): Path<String>,
    headers: HeaderMap,
    raw: Bytes,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let content_type = header(&headers, "content-type").unwrap_or_default();
    if content_type.starts_with("multipart/form-data") {
        let text = String::from_utf8_lossy(&raw).to_string();
        state.uploads.lock().unwrap().push((content_type, text));
        return (
            StatusCode::CREATED,
            Json(json!({"id": 102, "title": "Q3 deck", "document_file": "/media/deck.pdf"})),
        )
            .into_response();
    }
    let body: Value = match serde_json::from_slice(&raw) {
        Ok(body) => body,
        Err(e) => return error(StatusCode::BAD_REQUEST, json!({"detail": e.to_string()})),
    };
    state.bodies.lock().unwrap().push(body.clone());

    if resource == "leads" && body.get("title").is_none() {
        return error(
            StatusCode::BAD_REQUEST,
            json!({"error": true, "errors": {"title": ["This field is required."]}}),
        );
    }
    if resource == "invoices" {
        return error(
            StatusCode::BAD_REQUEST,
            json!({"error": true, "message": "Missing org_id in token"}),
        );
    }

    let mut record = body;
    record["id"] = json!(101);
    (StatusCode::CREATED, Json(record)).into_response()
}

async fn fetch(
    State(state): Shared,
    Path((resource, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let key = format!("{}/{}", resource, id);
    if id == "404" || state.deleted.lock().unwrap().contains(&key) {
        return error(StatusCode::NOT_FOUND, json!({"detail": "Not found."}));
    }
    Json(json!({"id": id.parse::<i64>().unwrap_or(0), "title": "Renewal"})).into_response()
}

async fn replace(
    State(state): Shared,
    Path((_resource, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    state.bodies.lock().unwrap().push(body.clone());
    let mut record = body;
    record["id"] = json!(id.parse::<i64>().unwrap_or(0));
    Json(record).into_response()
}

async fn remove(
    State(state): Shared,
    Path((resource, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let key = format!("{}/{}", resource, id);
    if !state.deleted.lock().unwrap().insert(key) {
        return error(StatusCode::NOT_FOUND, json!({"detail": "Not found."}));
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn comment(
    State(state): Shared,
    Path((_resource, _id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    state.bodies.lock().unwrap().push(body.clone());
    (StatusCode::CREATED, Json(json!({"id": 1, "comment": body["comment"]}))).into_response()
}

async fn attachment(
    State(state): Shared,
    Path((_resource, _id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(resp) = authorize(&state, &headers) {
        return resp;
    }
    let content_type = header(&headers, "content-type").unwrap_or_default();
    let text = String::from_utf8_lossy(&body).to_string();
    state.uploads.lock().unwrap().push((content_type, text));
    (StatusCode::CREATED, Json(json!({"id": 2, "file_name": "notes.txt"}))).into_response()
}
