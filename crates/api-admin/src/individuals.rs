//! Patient list queries and data reloads.

use crate::extract::{AdminUser, CurrentUser};
use crate::AdminState;
use api_shared::{ApiError, ApiResult, Individual, IndividualsQuery, ReloadRes};
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::Json,
};
use consent_core::records::{self, SortDirection};
use consent_core::{PatientRecord, PublicUser, RecordStore};
use consent_types::ParticipantId;

/// Records the user may see: every list for admins, their own list otherwise.
pub(crate) fn visible_records(store: &RecordStore, user: &PublicUser) -> Vec<PatientRecord> {
    if user.is_admin() {
        store.all_records()
    } else if user.list.is_empty() {
        Vec::new()
    } else {
        store.records_for(&user.list)
    }
}

/// Parses `raw` and checks the record is visible to `user`.
///
/// Records outside the user's list answer 404, same as unknown ones.
pub(crate) async fn visible_record_id(
    state: &AdminState,
    user: &PublicUser,
    raw: &str,
) -> ApiResult<ParticipantId> {
    let id = ParticipantId::parse(raw)?;
    let store = state.records.read().await;
    if visible_records(&store, user)
        .iter()
        .any(|r| r.id() == id.as_str())
    {
        Ok(id)
    } else {
        Err(ApiError::NotFound(format!("record {id} not found")))
    }
}

#[utoipa::path(
    get,
    path = "/api/individuals",
    params(IndividualsQuery),
    responses(
        (status = 200, description = "The user's patient records, searched then sorted", body = [Individual]),
        (status = 400, description = "Invalid sort direction", body = api_shared::ErrorRes),
        (status = 401, description = "Not logged in", body = api_shared::ErrorRes)
    )
)]
/// List the patient records visible to the logged-in user
#[axum::debug_handler]
pub async fn list_individuals(
    State(state): State<AdminState>,
    current: CurrentUser,
    query: Result<Query<IndividualsQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Individual>>> {
    let Query(query) = query.map_err(|e| ApiError::Validation(e.body_text()))?;
    let direction = query
        .direction
        .as_deref()
        .unwrap_or_default()
        .parse::<SortDirection>()?;

    let mut rows = visible_records(&*state.records.read().await, &current.user);
    if let Some(text) = query.search.as_deref() {
        rows = records::search(rows, text);
    }
    if let Some(field) = query.sort.as_deref().filter(|f| !f.trim().is_empty()) {
        rows = records::sort(rows, field.trim(), direction);
    }

    Ok(Json(rows.into_iter().map(Individual::from).collect()))
}

#[utoipa::path(
    post,
    path = "/api/reload",
    responses(
        (status = 200, description = "Credentials and patient lists re-read", body = ReloadRes),
        (status = 403, description = "Admin role required", body = api_shared::ErrorRes)
    )
)]
/// Re-read the credentials file and every patient list
#[axum::debug_handler]
pub async fn reload(
    State(state): State<AdminState>,
    AdminUser(admin): AdminUser,
) -> ApiResult<Json<ReloadRes>> {
    let users = state.credentials.write().await.reload()?;
    let records = state.records.write().await.reload()?;
    tracing::info!(
        "{} reloaded data: {} accounts, {} records",
        admin.username,
        users,
        records
    );
    Ok(Json(ReloadRes {
        success: true,
        users,
        records,
    }))
}
