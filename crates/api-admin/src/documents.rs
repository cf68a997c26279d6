//! Identity document upload, lookup and removal.

use crate::extract::CurrentUser;
use crate::individuals::visible_record_id;
use crate::AdminState;
use api_shared::{ApiError, ApiResult, DocumentCheckRes, DocumentDeleteRes, DocumentUploadRes};
use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    response::Json,
};

/// Largest accepted document.
pub const MAX_DOCUMENT_BYTES: usize = 10 * 1024 * 1024;

/// Extension for a sniffed content type, if it is one we accept.
pub fn document_extension(bytes: &[u8]) -> Option<&'static str> {
    match infer::get(bytes)?.mime_type() {
        "application/pdf" => Some("pdf"),
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        _ => None,
    }
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("document exceeds 10 MiB".into())
    } else {
        ApiError::Validation(err.body_text())
    }
}

#[utoipa::path(
    post,
    path = "/api/upload-document",
    request_body(content_type = "multipart/form-data", description = "Fields `id` and `file`"),
    responses(
        (status = 200, description = "Document stored", body = DocumentUploadRes),
        (status = 400, description = "Missing field or unsupported file type", body = api_shared::ErrorRes),
        (status = 404, description = "Record not in the user's list", body = api_shared::ErrorRes),
        (status = 413, description = "Document too large", body = api_shared::ErrorRes)
    )
)]
/// Attach an identity document (PDF, JPEG or PNG) to a record
///
/// Replaces any document the record already has, in either folder.
#[axum::debug_handler]
pub async fn upload_document(
    State(state): State<AdminState>,
    current: CurrentUser,
    mut multipart: Multipart,
) -> ApiResult<Json<DocumentUploadRes>> {
    let mut record_id = None;
    let mut file = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("id") => record_id = Some(field.text().await.map_err(multipart_error)?),
            Some("file") => file = Some(field.bytes().await.map_err(multipart_error)?),
            _ => {}
        }
    }

    let record_id = record_id.ok_or_else(|| ApiError::Validation("id is required".into()))?;
    let bytes = file.ok_or_else(|| ApiError::Validation("file is required".into()))?;
    if bytes.is_empty() {
        return Err(ApiError::Validation("file is empty".into()));
    }
    if bytes.len() > MAX_DOCUMENT_BYTES {
        return Err(ApiError::PayloadTooLarge("document exceeds 10 MiB".into()));
    }
    let extension = document_extension(&bytes).ok_or_else(|| {
        ApiError::Validation("only PDF, JPEG and PNG documents are accepted".into())
    })?;

    let id = visible_record_id(&state, &current.user, &record_id).await?;
    let size = bytes.len();
    let entry = state.documents.upload(&id, extension, bytes.to_vec()).await?;
    let path = entry
        .path_display
        .unwrap_or_else(|| format!("{}/{id}.{extension}", consent_cloud::DOCUMENTS_FOLDER));

    tracing::info!("{} uploaded a document for record {}", current.user.username, id);
    Ok(Json(DocumentUploadRes {
        success: true,
        path,
        size,
    }))
}

#[utoipa::path(
    get,
    path = "/api/check-document/{id}",
    params(("id" = String, Path, description = "Record id")),
    responses(
        (status = 200, description = "Whether a document exists, with a temporary link", body = DocumentCheckRes),
        (status = 404, description = "Record not in the user's list", body = api_shared::ErrorRes)
    )
)]
/// Look up a record's document
#[axum::debug_handler]
pub async fn check_document(
    State(state): State<AdminState>,
    current: CurrentUser,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<DocumentCheckRes>> {
    let id = visible_record_id(&state, &current.user, &raw_id).await?;
    let lookup = state.documents.exists(&id).await?;
    Ok(Json(DocumentCheckRes::from(lookup)))
}

#[utoipa::path(
    delete,
    path = "/api/delete-document/{id}",
    params(("id" = String, Path, description = "Record id")),
    responses(
        (status = 200, description = "Every stored copy deleted; `found` is false if none existed", body = DocumentDeleteRes),
        (status = 404, description = "Record not in the user's list", body = api_shared::ErrorRes)
    )
)]
/// Delete a record's document from both folders
#[axum::debug_handler]
pub async fn delete_document(
    State(state): State<AdminState>,
    current: CurrentUser,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<DocumentDeleteRes>> {
    let id = visible_record_id(&state, &current.user, &raw_id).await?;
    let deletion = state.documents.delete(&id).await?;
    if deletion.found {
        tracing::info!("{} deleted the document for record {}", current.user.username, id);
    }
    Ok(Json(DocumentDeleteRes::from(deletion)))
}
