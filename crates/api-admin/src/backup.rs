//! Admin-only backup and token maintenance endpoints.
//!
//! Every operation answers with an `OperationOutcome`; failures carry the
//! error text and a hint and use status 500, successes use 200.

use crate::extract::AdminUser;
use crate::AdminState;
use api_shared::{ApiError, ApiResult, CleanupReq};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use consent_core::{BackupStatus, OperationOutcome};

fn outcome_response(outcome: OperationOutcome) -> Response {
    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(outcome)).into_response()
}

#[utoipa::path(
    get,
    path = "/admin/backup/status",
    responses(
        (status = 200, description = "Local backups, retention and remote storage state"),
        (status = 403, description = "Admin role required", body = api_shared::ErrorRes)
    )
)]
/// Backup status
pub async fn status(
    State(state): State<AdminState>,
    _admin: AdminUser,
) -> ApiResult<Json<BackupStatus>> {
    Ok(Json(state.backups.status().await?))
}

#[utoipa::path(
    post,
    path = "/admin/backup/local",
    responses(
        (status = 200, description = "Snapshot written"),
        (status = 500, description = "Snapshot failed; body carries error and hint")
    )
)]
/// Snapshot the database locally, then prune old snapshots
pub async fn local(State(state): State<AdminState>, AdminUser(admin): AdminUser) -> Response {
    tracing::info!("{} requested a local backup", admin.username);
    outcome_response(OperationOutcome::from_result(
        "local backup",
        state.backups.snapshot_local().await,
    ))
}

#[utoipa::path(
    post,
    path = "/admin/backup/csv-dropbox",
    responses(
        (status = 200, description = "CSV files uploaded"),
        (status = 500, description = "Export failed; body carries error and hint")
    )
)]
/// Export consent responses and patient lists as CSV to remote storage
pub async fn csv_export(State(state): State<AdminState>, AdminUser(admin): AdminUser) -> Response {
    tracing::info!("{} requested a CSV export", admin.username);
    outcome_response(OperationOutcome::from_result("CSV export", state.backups.export_csv().await))
}

#[utoipa::path(
    post,
    path = "/admin/backup/db-dropbox",
    responses(
        (status = 200, description = "Database uploaded"),
        (status = 500, description = "Export failed; body carries error and hint")
    )
)]
/// Upload a copy of the database to remote storage
pub async fn db_export(State(state): State<AdminState>, AdminUser(admin): AdminUser) -> Response {
    tracing::info!("{} requested a database export", admin.username);
    outcome_response(OperationOutcome::from_result(
        "database export",
        state.backups.export_database().await,
    ))
}

#[utoipa::path(
    post,
    path = "/admin/backup/full",
    responses(
        (status = 200, description = "Every layer succeeded"),
        (status = 500, description = "At least one layer failed; per-layer outcomes in the body")
    )
)]
/// Run local, CSV and database backups in sequence
pub async fn full(State(state): State<AdminState>, AdminUser(admin): AdminUser) -> Response {
    tracing::info!("{} requested a full backup", admin.username);
    let report = state.backups.run_all().await;
    let status = if report.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(report)).into_response()
}

#[utoipa::path(
    post,
    path = "/admin/backup/cleanup",
    request_body(content = CleanupReq, description = "Optional; defaults to the configured retention"),
    responses(
        (status = 200, description = "Expired snapshots removed"),
        (status = 400, description = "Invalid body", body = api_shared::ErrorRes)
    )
)]
/// Delete local snapshots past the retention window
///
/// The body is optional; an empty one uses the configured retention.
pub async fn cleanup(
    State(state): State<AdminState>,
    AdminUser(admin): AdminUser,
    body: Bytes,
) -> ApiResult<Response> {
    let req: CleanupReq = if body.iter().all(u8::is_ascii_whitespace) {
        CleanupReq::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::Validation(e.to_string()))?
    };
    let days = req
        .retention_days
        .unwrap_or_else(|| state.backups.retention_days());
    tracing::info!("{} requested cleanup with {} day retention", admin.username, days);

    let result = state.backups.cleanup(days).await.map(|removed| {
        serde_json::json!({
            "retention_days": days,
            "removed": removed,
        })
    });
    Ok(outcome_response(OperationOutcome::from_result("cleanup", result)))
}

#[utoipa::path(
    get,
    path = "/admin/backup/list-dropbox",
    responses(
        (status = 200, description = "Files under the remote backup folder"),
        (status = 500, description = "Listing failed; body carries error and hint")
    )
)]
/// List remote backup files
pub async fn list_remote(State(state): State<AdminState>, _admin: AdminUser) -> Response {
    outcome_response(OperationOutcome::from_result(
        "remote listing",
        state.backups.list_remote().await,
    ))
}

#[utoipa::path(
    get,
    path = "/admin/backup/validate-token",
    responses(
        (status = 200, description = "Refresh token works"),
        (status = 500, description = "Refresh token rejected; body carries a hint")
    )
)]
/// Check the remote storage refresh token
pub async fn validate_token(State(state): State<AdminState>, _admin: AdminUser) -> Response {
    outcome_response(state.backups.validate_token().await)
}

#[utoipa::path(
    post,
    path = "/admin/backup/refresh-token",
    responses(
        (status = 200, description = "New access token minted"),
        (status = 500, description = "Refresh failed; body carries a hint")
    )
)]
/// Force a new access token
pub async fn refresh_token(State(state): State<AdminState>, AdminUser(admin): AdminUser) -> Response {
    tracing::info!("{} forced an access token refresh", admin.username);
    outcome_response(state.backups.refresh_token().await)
}
