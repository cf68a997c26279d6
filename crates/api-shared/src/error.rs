use crate::dto::ErrorRes;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use consent_cloud::CloudError;
use consent_core::CoreError;
use consent_types::IdError;
use std::sync::atomic::{AtomicBool, Ordering};

static EXPOSE_INTERNAL_DETAILS: AtomicBool = AtomicBool::new(false);

/// Whether 500 responses carry the underlying error text.
///
/// Set once at startup; off in production.
pub fn expose_internal_details(expose: bool) {
    EXPOSE_INTERNAL_DETAILS.store(expose, Ordering::Relaxed);
}

/// Errors returned by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorised(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    TooManyRequests(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("internal server error")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorised(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            ApiError::Internal(detail) => {
                tracing::error!("internal error: {}", detail);
                EXPOSE_INTERNAL_DETAILS
                    .load(Ordering::Relaxed)
                    .then(|| detail.clone())
            }
            _ => None,
        };

        let body = ErrorRes {
            ok: false,
            error: self.to_string(),
            detail,
        };
        (status, Json(body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidInput(msg) => ApiError::Validation(msg),
            CoreError::InvalidCredentials => ApiError::Unauthorised(err.to_string()),
            CoreError::DuplicateParticipant(_) => ApiError::Conflict(err.to_string()),
            CoreError::Cloud(cloud) => cloud.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<CloudError> for ApiError {
    fn from(err: CloudError) -> Self {
        let detail = match err.hint() {
            Some(hint) => format!("{err} ({hint})"),
            None => err.to_string(),
        };
        ApiError::Internal(detail)
    }
}

impl From<IdError> for ApiError {
    fn from(err: IdError) -> Self {
        ApiError::Validation(format!("invalid id: {err}"))
    }
}
