//! # API Shared
//!
//! Shared utilities and definitions for the consent HTTP APIs.
//!
//! Contains:
//! - Request/response types with OpenAPI schemas (`dto` module)
//! - `ApiError`, the mapping from domain errors to HTTP responses
//! - Session cookie, submission token and client address helpers
//! - CORS policy and the `HealthService`
//!
//! Used by `api-consent` and `api-admin` for common functionality.

pub mod auth;
pub mod cors;
pub mod dto;
pub mod error;
pub mod health;

pub use dto::*;
pub use error::{expose_internal_details, ApiError, ApiResult};
pub use health::HealthService;
