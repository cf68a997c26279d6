//! In-process stand-in for the remote storage API.
//!
//! Serves the token endpoint and the handful of file routes the client uses,
//! from an axum server bound to `127.0.0.1:0`. Paths are compared
//! case-insensitively, as the real service does.

use crate::{DropboxClient, DropboxEndpoints, OAuthSecrets, TokenCache};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct FakeState {
    base_url: String,
    files: Mutex<BTreeMap<String, (String, Vec<u8>)>>,
    token_requests: AtomicUsize,
    valid_token: Mutex<Option<String>>,
    fail_token_endpoint: Mutex<bool>,
    fail_uploads: AtomicBool,
}

/// A running fake storage server.
pub struct FakeDropbox {
    state: Arc<FakeState>,
}

impl FakeDropbox {
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake storage listener");
        let addr = listener.local_addr().expect("listener address");

        let state = Arc::new(FakeState {
            base_url: format!("http://{addr}"),
            files: Mutex::new(BTreeMap::new()),
            token_requests: AtomicUsize::new(0),
            valid_token: Mutex::new(None),
            fail_token_endpoint: Mutex::new(false),
            fail_uploads: AtomicBool::new(false),
        });

        let app = Router::new()
            .route("/oauth2/token", post(token))
            .route("/2/files/upload", post(upload))
            .route("/2/files/get_metadata", post(get_metadata))
            .route("/2/files/get_temporary_link", post(temporary_link))
            .route("/2/files/delete_v2", post(delete))
            .route("/2/files/list_folder", post(list_folder))
            .route("/2/files/list_folder/continue", post(list_folder_continue))
            .route("/2/users/get_current_account", post(current_account))
            .with_state(state.clone());

        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { state }
    }

    pub fn base_url(&self) -> &str {
        &self.state.base_url
    }

    pub fn endpoints(&self) -> DropboxEndpoints {
        DropboxEndpoints::single_host(&self.state.base_url)
    }

    pub fn secrets() -> OAuthSecrets {
        OAuthSecrets::from_parts(
            Some("fake-app-key".into()),
            Some("fake-app-secret".into()),
            Some("fake-refresh-token".into()),
        )
        .expect("complete fake secrets")
    }

    /// Client with complete OAuth secrets pointed at this server.
    pub fn client(&self) -> DropboxClient {
        let endpoints = self.endpoints();
        let tokens = Arc::new(
            TokenCache::dropbox(Some(Self::secrets()), &endpoints).expect("token cache"),
        );
        DropboxClient::new(tokens, endpoints).expect("client")
    }

    /// Client without OAuth secrets.
    pub fn unconfigured_client(&self) -> DropboxClient {
        let endpoints = self.endpoints();
        let tokens = Arc::new(TokenCache::dropbox(None, &endpoints).expect("token cache"));
        DropboxClient::new(tokens, endpoints).expect("client")
    }

    /// Number of refresh exchanges served.
    pub fn token_requests(&self) -> usize {
        self.state.token_requests.load(Ordering::SeqCst)
    }

    /// Makes every issued token invalid, as if revoked server-side.
    pub fn revoke_tokens(&self) {
        *self.state.valid_token.lock().expect("token lock") = None;
    }

    /// Makes the token endpoint answer 400 from now on.
    pub fn fail_token_endpoint(&self) {
        *self.state.fail_token_endpoint.lock().expect("flag lock") = true;
    }

    /// Makes every upload answer 507 from now on; other routes keep working.
    pub fn fail_uploads(&self) {
        self.state.fail_uploads.store(true, Ordering::SeqCst);
    }

    /// Seeds a file directly, bypassing authentication.
    pub fn put(&self, path: &str, bytes: &[u8]) {
        self.state
            .files
            .lock()
            .expect("files lock")
            .insert(path.to_lowercase(), (path.to_string(), bytes.to_vec()));
    }

    pub fn stored(&self, path: &str) -> Option<Vec<u8>> {
        self.state
            .files
            .lock()
            .expect("files lock")
            .get(&path.to_lowercase())
            .map(|(_, bytes)| bytes.clone())
    }

    /// Display paths of every stored file, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.state
            .files
            .lock()
            .expect("files lock")
            .values()
            .map(|(display, _)| display.clone())
            .collect()
    }
}

fn api_error(status: StatusCode, summary: &str) -> Response {
    (status, Json(json!({ "error_summary": summary }))).into_response()
}

fn authorised(state: &FakeState, headers: &HeaderMap) -> bool {
    let valid = state.valid_token.lock().expect("token lock").clone();
    let presented = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    matches!((valid, presented), (Some(v), Some(p)) if v == p)
}

fn file_entry(display: &str, size: usize) -> Value {
    let name = display.rsplit('/').next().unwrap_or(display);
    json!({
        ".tag": "file",
        "name": name,
        "path_display": display,
        "size": size,
        "server_modified": "2025-01-01T00:00:00Z",
    })
}

fn path_arg(body: &Value) -> String {
    body.get("path")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

async fn token(State(state): State<Arc<FakeState>>) -> Response {
    let n = state.token_requests.fetch_add(1, Ordering::SeqCst) + 1;
    if *state.fail_token_endpoint.lock().expect("flag lock") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_grant" })),
        )
            .into_response();
    }
    let token = format!("fake-access-{n}");
    *state.valid_token.lock().expect("token lock") = Some(token.clone());
    Json(json!({
        "access_token": token,
        "token_type": "bearer",
        "expires_in": 14400,
    }))
    .into_response()
}

async fn upload(State(state): State<Arc<FakeState>>, headers: HeaderMap, body: Bytes) -> Response {
    if !authorised(&state, &headers) {
        return api_error(StatusCode::UNAUTHORIZED, "expired_access_token/");
    }
    let arg: Value = headers
        .get("dropbox-api-arg")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| serde_json::from_str(v).ok())
        .unwrap_or(Value::Null);
    if state.fail_uploads.load(Ordering::SeqCst) {
        return api_error(StatusCode::INSUFFICIENT_STORAGE, "insufficient_space/");
    }
    let path = path_arg(&arg);
    let mode = arg.get("mode").and_then(Value::as_str).unwrap_or("add");

    let mut files = state.files.lock().expect("files lock");
    let key = path.to_lowercase();
    if mode == "add" && files.contains_key(&key) {
        return api_error(StatusCode::CONFLICT, "path/conflict/file/");
    }
    let size = body.len();
    files.insert(key, (path.clone(), body.to_vec()));
    Json(file_entry(&path, size)).into_response()
}

async fn get_metadata(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorised(&state, &headers) {
        return api_error(StatusCode::UNAUTHORIZED, "expired_access_token/");
    }
    let path = path_arg(&body);
    let files = state.files.lock().expect("files lock");
    match files.get(&path.to_lowercase()) {
        Some((display, bytes)) => Json(file_entry(display, bytes.len())).into_response(),
        None => api_error(StatusCode::CONFLICT, "path/not_found/"),
    }
}

async fn temporary_link(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorised(&state, &headers) {
        return api_error(StatusCode::UNAUTHORIZED, "expired_access_token/");
    }
    let path = path_arg(&body);
    let files = state.files.lock().expect("files lock");
    match files.get(&path.to_lowercase()) {
        Some((display, bytes)) => Json(json!({
            "link": format!("{}/dl{}", state.base_url, display),
            "metadata": file_entry(display, bytes.len()),
        }))
        .into_response(),
        None => api_error(StatusCode::CONFLICT, "path/not_found/"),
    }
}

async fn delete(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorised(&state, &headers) {
        return api_error(StatusCode::UNAUTHORIZED, "expired_access_token/");
    }
    let path = path_arg(&body);
    let mut files = state.files.lock().expect("files lock");
    match files.remove(&path.to_lowercase()) {
        Some((display, bytes)) => {
            Json(json!({ "metadata": file_entry(&display, bytes.len()) })).into_response()
        }
        None => api_error(StatusCode::CONFLICT, "path_lookup/not_found/"),
    }
}

async fn list_folder(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorised(&state, &headers) {
        return api_error(StatusCode::UNAUTHORIZED, "expired_access_token/");
    }
    let folder = path_arg(&body).to_lowercase();
    let recursive = body
        .get("recursive")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let prefix = format!("{}/", folder.trim_end_matches('/'));

    let files = state.files.lock().expect("files lock");
    let entries: Vec<Value> = files
        .iter()
        .filter(|(key, _)| key.starts_with(&prefix))
        .filter(|(key, _)| recursive || !key[prefix.len()..].contains('/'))
        .map(|(_, (display, bytes))| file_entry(display, bytes.len()))
        .collect();

    if entries.is_empty() {
        return api_error(StatusCode::CONFLICT, "path/not_found/");
    }
    Json(json!({ "entries": entries, "cursor": "end", "has_more": false })).into_response()
}

async fn list_folder_continue(State(state): State<Arc<FakeState>>, headers: HeaderMap) -> Response {
    if !authorised(&state, &headers) {
        return api_error(StatusCode::UNAUTHORIZED, "expired_access_token/");
    }
    Json(json!({ "entries": [], "cursor": "end", "has_more": false })).into_response()
}

async fn current_account(State(state): State<Arc<FakeState>>, headers: HeaderMap) -> Response {
    if !authorised(&state, &headers) {
        return api_error(StatusCode::UNAUTHORIZED, "invalid_access_token/");
    }
    Json(json!({
        "email": "research@example.org",
        "name": { "display_name": "Research Team" },
    }))
    .into_response()
}
