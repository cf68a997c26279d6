//! # API Admin
//!
//! Session-authenticated admin panel for study staff.
//!
//! Handles:
//! - login, logout and the current user
//! - patient list queries, scoped to each user's list
//! - identity documents held in remote storage
//! - backup and token maintenance (admin role only)
//! - OpenAPI/Swagger documentation
//!
//! Uses `api-shared` for DTOs, cookies and error mapping.

#![warn(rust_2018_idioms)]

pub mod backup;
pub mod documents;
pub mod extract;
pub mod individuals;
pub mod session;

use api_shared::{cors::cors_layer, HealthRes, HealthService};
use axum::{
    extract::DefaultBodyLimit,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use consent_cloud::DocumentStore;
use consent_core::{AppContext, BackupService, CredentialStore, RecordStore, SessionStore};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Shared state of the admin panel.
#[derive(Clone)]
pub struct AdminState {
    pub credentials: Arc<RwLock<CredentialStore>>,
    pub records: Arc<RwLock<RecordStore>>,
    pub sessions: SessionStore,
    pub documents: DocumentStore,
    pub backups: Arc<BackupService>,
    /// Marks the session cookie `Secure`; on in production.
    pub secure_cookies: bool,
    pub session_ttl_secs: i64,
}

impl AdminState {
    pub fn from_context(ctx: &AppContext) -> Self {
        Self {
            credentials: ctx.credentials.clone(),
            records: ctx.records.clone(),
            sessions: ctx.sessions.clone(),
            documents: ctx.documents.clone(),
            backups: ctx.backups.clone(),
            secure_cookies: ctx.config.environment.is_production(),
            session_ttl_secs: ctx.sessions.ttl_secs(),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        session::login,
        session::logout,
        session::me,
        individuals::list_individuals,
        individuals::reload,
        documents::upload_document,
        documents::check_document,
        documents::delete_document,
        backup::status,
        backup::local,
        backup::csv_export,
        backup::db_export,
        backup::full,
        backup::cleanup,
        backup::list_remote,
        backup::validate_token,
        backup::refresh_token,
    ),
    components(schemas(
        HealthRes,
        api_shared::LoginReq,
        api_shared::LoginRes,
        api_shared::UserRes,
        api_shared::SuccessRes,
        api_shared::Individual,
        api_shared::ReloadRes,
        api_shared::DocumentUploadRes,
        api_shared::DocumentCheckRes,
        api_shared::DocumentDeleteRes,
        api_shared::CleanupReq,
        api_shared::ErrorRes
    ))
)]
struct ApiDoc;

/// Builds the admin router with tracing and the configured CORS policy.
pub fn router(state: AdminState, allowed_origins: &[String], production: bool) -> Router {
    let backup_routes = Router::new()
        .route("/status", get(backup::status))
        .route("/local", post(backup::local))
        .route("/csv-dropbox", post(backup::csv_export))
        .route("/db-dropbox", post(backup::db_export))
        .route("/full", post(backup::full))
        .route("/cleanup", post(backup::cleanup))
        .route("/list-dropbox", get(backup::list_remote))
        .route("/validate-token", get(backup::validate_token))
        .route("/refresh-token", post(backup::refresh_token));

    Router::new()
        .route("/api/health", get(health))
        .route("/api/login", post(session::login))
        .route("/api/logout", post(session::logout))
        .route("/api/me", get(session::me))
        .route("/api/individuals", get(individuals::list_individuals))
        .route("/api/reload", post(individuals::reload))
        .route(
            "/api/upload-document",
            post(documents::upload_document)
                // Room for the multipart framing around a maximum-size file.
                .layer(DefaultBodyLimit::max(documents::MAX_DOCUMENT_BYTES + 64 * 1024)),
        )
        .route("/api/check-document/:id", get(documents::check_document))
        .route("/api/delete-document/:id", delete(documents::delete_document))
        .nest("/admin/backup", backup_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors_layer(allowed_origins, production))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the admin panel
async fn health() -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use consent_cloud::testing::FakeDropbox;
    use consent_core::AppConfig;
    use http_body_util::BodyExt;
    use std::collections::HashMap;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const USERS: &str = "\
username,password,name,language,role,list
ann,ann-pw,Ann Jones,en,staff,clinic_a
bob,bob-pw,Bob Smith,cy,staff,clinic_b
root,root-pw,Rhian Evans,en,admin,
";

    const PNG: &[u8] = &[
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, b'I', b'H', b'D', b'R',
    ];

    struct Harness {
        _temp: TempDir,
        fake: FakeDropbox,
        state: AdminState,
    }

    impl Harness {
        async fn start() -> Self {
            let temp = TempDir::new().unwrap();
            std::fs::write(temp.path().join("users.csv"), USERS).unwrap();
            let lists = temp.path().join("lists");
            std::fs::create_dir_all(&lists).unwrap();
            std::fs::write(
                lists.join("clinic_a.csv"),
                "id,name,age\nA1,zoe,40\nA2,Adam,9\nA3,beth,100\n",
            )
            .unwrap();
            std::fs::write(lists.join("clinic_b.csv"), "id,name,age\nB1,Carys,55\n").unwrap();

            let fake = FakeDropbox::start().await;
            let mut env: HashMap<String, String> = HashMap::new();
            let path = |name: &str| temp.path().join(name).display().to_string();
            env.insert("DATABASE_PATH".into(), path("consent.db"));
            env.insert("USERS_CSV".into(), path("users.csv"));
            env.insert("RECORDS_DIR".into(), path("lists"));
            env.insert("BACKUP_DIR".into(), path("backups"));
            env.insert("DROPBOX_APP_KEY".into(), "fake-app-key".into());
            env.insert("DROPBOX_APP_SECRET".into(), "fake-app-secret".into());
            env.insert("DROPBOX_REFRESH_TOKEN".into(), "fake-refresh-token".into());
            let config = AppConfig::from_lookup(|key| env.get(key).cloned()).unwrap();

            let ctx = AppContext::initialise_with(config, fake.endpoints()).unwrap();
            Self {
                _temp: temp,
                fake,
                state: AdminState::from_context(&ctx),
            }
        }

        fn app(&self) -> Router {
            router(self.state.clone(), &[], false)
        }

        async fn send(&self, request: Request<Body>) -> Response {
            self.app().oneshot(request).await.unwrap()
        }

        /// Logs in and returns the `Cookie` header value for the session.
        async fn login(&self, username: &str, password: &str) -> String {
            let response = self
                .send(json_post(
                    "/api/login",
                    serde_json::json!({"username": username, "password": password}),
                ))
                .await;
            assert_eq!(response.status(), StatusCode::OK);
            let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
            set_cookie.split(';').next().unwrap().to_string()
        }
    }

    fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_as(uri: &str, cookie: &str) -> Request<Body> {
        Request::get(uri)
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap()
    }

    fn upload_as(cookie: &str, id: &str, bytes: &[u8]) -> Request<Body> {
        let boundary = "consent-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"id\"\r\n\r\n{id}\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"scan\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        Request::post("/api/upload-document")
            .header(header::COOKIE, cookie)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn ids(body: &serde_json::Value) -> Vec<String> {
        body.as_array()
            .unwrap()
            .iter()
            .map(|row| row["id"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn wrong_password_is_rejected_without_a_cookie() {
        let h = Harness::start().await;
        let response = h
            .send(json_post(
                "/api/login",
                serde_json::json!({"username": "ann", "password": "nope"}),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        assert!(h.state.sessions.is_empty());
    }

    #[tokio::test]
    async fn login_returns_the_user_without_a_password() {
        let h = Harness::start().await;
        let response = h
            .send(json_post(
                "/api/login",
                serde_json::json!({"username": "ann", "password": "ann-pw"}),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("consent_admin_sid="));
        assert!(cookie.contains("HttpOnly"));

        let body = json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["user"]["username"], "ann");
        assert_eq!(body["user"]["role"], "staff");
        assert_eq!(body["user"]["list"], "clinic_a");
        assert!(body["user"].get("password").is_none());
    }

    #[tokio::test]
    async fn me_requires_a_live_session_and_logout_ends_it() {
        let h = Harness::start().await;
        let anonymous = h.send(Request::get("/api/me").body(Body::empty()).unwrap()).await;
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let cookie = h.login("bob", "bob-pw").await;
        let me = h.send(get_as("/api/me", &cookie)).await;
        assert_eq!(me.status(), StatusCode::OK);
        assert_eq!(json(me).await["language"], "cy");

        let logout = h
            .send(
                Request::post("/api/logout")
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(logout.status(), StatusCode::OK);
        assert!(logout.headers()[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .contains("Max-Age=0"));

        let after = h.send(get_as("/api/me", &cookie)).await;
        assert_eq!(after.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn staff_see_only_their_list_and_admins_see_all() {
        let h = Harness::start().await;

        let ann = h.login("ann", "ann-pw").await;
        let rows = json(h.send(get_as("/api/individuals", &ann)).await).await;
        assert_eq!(ids(&rows), ["A1", "A2", "A3"]);

        let root = h.login("root", "root-pw").await;
        let rows = json(h.send(get_as("/api/individuals", &root)).await).await;
        let mut all = ids(&rows);
        all.sort();
        assert_eq!(all, ["A1", "A2", "A3", "B1"]);
    }

    #[tokio::test]
    async fn individuals_search_then_sort() {
        let h = Harness::start().await;
        let ann = h.login("ann", "ann-pw").await;

        let by_age = json(h.send(get_as("/api/individuals?sort=age", &ann)).await).await;
        assert_eq!(ids(&by_age), ["A2", "A1", "A3"]);

        let by_name_desc = json(
            h.send(get_as("/api/individuals?sort=name&direction=desc", &ann))
                .await,
        )
        .await;
        assert_eq!(ids(&by_name_desc), ["A1", "A3", "A2"]);

        let searched = json(
            h.send(get_as("/api/individuals?search=ZO&sort=age", &ann))
                .await,
        )
        .await;
        assert_eq!(ids(&searched), ["A1"]);

        let bad = h
            .send(get_as("/api/individuals?sort=age&direction=sideways", &ann))
            .await;
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn staff_cannot_reach_admin_routes() {
        let h = Harness::start().await;
        let ann = h.login("ann", "ann-pw").await;

        let status = h.send(get_as("/admin/backup/status", &ann)).await;
        assert_eq!(status.status(), StatusCode::FORBIDDEN);

        let reload = h
            .send(
                Request::post("/api/reload")
                    .header(header::COOKIE, &ann)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(reload.status(), StatusCode::FORBIDDEN);

        let anonymous = h
            .send(Request::post("/admin/backup/local").body(Body::empty()).unwrap())
            .await;
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_backup_routes_report_outcomes() {
        let h = Harness::start().await;
        let root = h.login("root", "root-pw").await;

        let local = h
            .send(
                Request::post("/admin/backup/local")
                    .header(header::COOKIE, &root)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(local.status(), StatusCode::OK);
        let body = json(local).await;
        assert_eq!(body["success"], true);
        assert!(body["details"]["file"]
            .as_str()
            .unwrap()
            .starts_with("consent-"));

        let cleanup = h
            .send(
                Request::post("/admin/backup/cleanup")
                    .header(header::COOKIE, &root)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(cleanup.status(), StatusCode::OK);
        assert_eq!(json(cleanup).await["details"]["removed"], serde_json::json!([]));

        let status = json(h.send(get_as("/admin/backup/status", &root)).await).await;
        assert_eq!(status["local_backups"].as_array().unwrap().len(), 1);

        let token = json(h.send(get_as("/admin/backup/validate-token", &root)).await).await;
        assert_eq!(token["success"], true);

        let db = h
            .send(
                Request::post("/admin/backup/db-dropbox")
                    .header(header::COOKIE, &root)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(db.status(), StatusCode::OK);
        assert!(h.fake.paths().iter().any(|p| p.starts_with("/backups/db/")));
    }

    #[tokio::test]
    async fn documents_round_trip_through_remote_storage() {
        let h = Harness::start().await;
        let ann = h.login("ann", "ann-pw").await;

        let before = json(h.send(get_as("/api/check-document/A1", &ann)).await).await;
        assert_eq!(before["found"], false);

        let upload = h.send(upload_as(&ann, "A1", PNG)).await;
        assert_eq!(upload.status(), StatusCode::OK);
        let body = json(upload).await;
        assert_eq!(body["path"], "/identity-documents/A1.png");
        assert_eq!(body["size"], PNG.len());
        assert_eq!(
            h.fake.stored("/identity-documents/A1.png").as_deref(),
            Some(PNG)
        );

        let found = json(h.send(get_as("/api/check-document/A1", &ann)).await).await;
        assert_eq!(found["found"], true);
        assert!(found["url"].as_str().is_some());

        let deleted = h
            .send(
                Request::delete("/api/delete-document/A1")
                    .header(header::COOKIE, &ann)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(deleted.status(), StatusCode::OK);
        assert_eq!(json(deleted).await["found"], true);
        assert!(h.fake.stored("/identity-documents/A1.png").is_none());
    }

    #[tokio::test]
    async fn documents_outside_the_users_list_are_not_found() {
        let h = Harness::start().await;
        let ann = h.login("ann", "ann-pw").await;

        let check = h.send(get_as("/api/check-document/B1", &ann)).await;
        assert_eq!(check.status(), StatusCode::NOT_FOUND);

        let upload = h.send(upload_as(&ann, "B1", PNG)).await;
        assert_eq!(upload.status(), StatusCode::NOT_FOUND);
        assert!(h.fake.paths().is_empty());

        let text = h.send(upload_as(&ann, "A1", b"just some text")).await;
        assert_eq!(text.status(), StatusCode::BAD_REQUEST);
    }
}
