//! # API Consent
//!
//! Public HTTP endpoint that records participants' consent decisions.
//!
//! Handles:
//! - `POST`/`GET /api/submit` with rate limiting and an optional shared token
//! - `GET /api/health`
//! - OpenAPI/Swagger documentation
//!
//! Storage and notifications come from `consent-core`; error mapping and DTOs
//! from `api-shared`.

#![warn(rust_2018_idioms)]

pub mod ratelimit;

use api_shared::{auth, cors::cors_layer, ApiError, ApiResult, HealthRes, HealthService, SubmitReq, SubmitRes};
use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, ConnectInfo, Query, State},
    http::HeaderMap,
    response::Json,
    routing::get,
    Router,
};
use consent_core::constants::SUBMIT_RATE_WINDOW_SECS;
use consent_core::{notify, AppContext, ConsentResponse, ConsentStore, Notifier};
use consent_types::{ConsentDecision, ParticipantId};
use ratelimit::RateLimiter;
use secrecy::SecretString;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Shared state of the consent endpoint.
#[derive(Clone)]
pub struct ConsentState {
    pub consent: Arc<ConsentStore>,
    pub notifier: Arc<dyn Notifier>,
    pub submit_token: Option<SecretString>,
    pub limiter: Arc<RateLimiter>,
}

impl ConsentState {
    pub fn from_context(ctx: &AppContext) -> Self {
        Self {
            consent: ctx.consent.clone(),
            notifier: ctx.notifier.clone(),
            submit_token: ctx.config.submit_token.clone(),
            limiter: Arc::new(RateLimiter::new(
                ctx.config.submit_rate_limit,
                Duration::from_secs(SUBMIT_RATE_WINDOW_SECS),
            )),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(health, submit_post, submit_get),
    components(schemas(HealthRes, SubmitReq, SubmitRes, api_shared::ErrorRes))
)]
struct ApiDoc;

/// Builds the consent router with tracing and the configured CORS policy.
pub fn router(state: ConsentState, allowed_origins: &[String], production: bool) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/submit", get(submit_get).post(submit_post))
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
/// Health check endpoint for the consent API
async fn health() -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    post,
    path = "/api/submit",
    request_body = SubmitReq,
    responses(
        (status = 200, description = "Consent recorded", body = SubmitRes),
        (status = 400, description = "Invalid payload", body = api_shared::ErrorRes),
        (status = 401, description = "Missing or wrong submission token", body = api_shared::ErrorRes),
        (status = 409, description = "Participant already responded", body = api_shared::ErrorRes),
        (status = 429, description = "Too many submissions from this address", body = api_shared::ErrorRes),
        (status = 500, description = "Internal server error", body = api_shared::ErrorRes)
    )
)]
/// Record a consent decision sent as a JSON body
#[axum::debug_handler]
async fn submit_post(
    State(state): State<ConsentState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<SubmitReq>, JsonRejection>,
) -> ApiResult<Json<SubmitRes>> {
    let ip = auth::client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));
    rate_limit(&state, ip.as_deref())?;
    let Json(req) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;
    submit(&state, req, ip, auth::user_agent(&headers)).await
}

#[utoipa::path(
    get,
    path = "/api/submit",
    params(SubmitReq),
    responses(
        (status = 200, description = "Consent recorded", body = SubmitRes),
        (status = 400, description = "Invalid payload", body = api_shared::ErrorRes),
        (status = 401, description = "Missing or wrong submission token", body = api_shared::ErrorRes),
        (status = 409, description = "Participant already responded", body = api_shared::ErrorRes),
        (status = 429, description = "Too many submissions from this address", body = api_shared::ErrorRes)
    )
)]
/// Record a consent decision sent in the query string, as email links do
#[axum::debug_handler]
async fn submit_get(
    State(state): State<ConsentState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    query: Result<Query<SubmitReq>, QueryRejection>,
) -> ApiResult<Json<SubmitRes>> {
    let ip = auth::client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));
    rate_limit(&state, ip.as_deref())?;
    let Query(req) = query.map_err(|e| ApiError::Validation(e.body_text()))?;
    submit(&state, req, ip, auth::user_agent(&headers)).await
}

fn rate_limit(state: &ConsentState, ip: Option<&str>) -> ApiResult<()> {
    let key = ip.unwrap_or("unknown");
    if state.limiter.check(key) {
        Ok(())
    } else {
        tracing::warn!("submission rate limit reached for {}", key);
        Err(ApiError::TooManyRequests(
            "too many submissions, please try again later".into(),
        ))
    }
}

/// Token check, validation, insert, then a background notification.
async fn submit(
    state: &ConsentState,
    req: SubmitReq,
    ip: Option<String>,
    user_agent: Option<String>,
) -> ApiResult<Json<SubmitRes>> {
    auth::validate_submit_token(state.submit_token.as_ref(), req.token.as_deref())?;

    let decision = req
        .response
        .as_deref()
        .ok_or_else(|| ApiError::Validation("response is required".into()))?
        .parse::<ConsentDecision>()
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    let participant_id = ParticipantId::parse(req.id.as_deref().unwrap_or_default())?;

    let response = ConsentResponse::new(participant_id, decision, ip, user_agent);
    let consent = state.consent.clone();
    let row = response.clone();
    tokio::task::spawn_blocking(move || consent.record(&row))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    notify::spawn_notification(state.notifier.clone(), response.clone());

    Ok(Json(SubmitRes {
        ok: true,
        ts: response.timestamp(),
    }))
}
