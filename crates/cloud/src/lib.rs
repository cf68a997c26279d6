//! Remote document storage for the consent services.
//!
//! This crate wraps the Dropbox HTTP API used to hold identity documents and
//! backup exports. It provides:
//!
//! - [`TokenCache`]: a single cached bearer credential, refreshed from a
//!   long-lived refresh token whenever it is missing or close to expiry
//! - [`DropboxClient`]: the small set of API calls the services need
//! - [`DocumentStore`]: per-record document attachments, searched across the
//!   current and legacy folder layouts
//!
//! ## Token lifecycle
//!
//! ```text
//! get_valid_token()
//!   ├── cached and now <= expires_at - 5 min  -> cached value
//!   └── otherwise                             -> refresh exchange
//!         ├── ok    -> replace cached value, expires_at = now + expires_in
//!         └── error -> CloudError::TokenRefresh, cached value untouched
//! ```
//!
//! Refreshes run under an async mutex, so concurrent callers during the
//! refresh window wait for one exchange instead of issuing their own.
//!
//! ## Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use consent_cloud::{DocumentStore, DropboxClient, DropboxEndpoints, OAuthSecrets, TokenCache};
//!
//! # async fn run() -> Result<(), consent_cloud::CloudError> {
//! let secrets = OAuthSecrets::from_parts(
//!     Some("app-key".into()),
//!     Some("app-secret".into()),
//!     Some("refresh-token".into()),
//! )?;
//! let endpoints = DropboxEndpoints::default();
//! let tokens = Arc::new(TokenCache::dropbox(Some(secrets), &endpoints)?);
//! let store = DocumentStore::new(DropboxClient::new(tokens, endpoints)?);
//!
//! let id = consent_types::ParticipantId::parse("P-0001").expect("valid id");
//! let lookup = store.exists(&id).await?;
//! println!("found: {}", lookup.found);
//! # Ok(())
//! # }
//! ```

mod constants;
mod documents;
mod dropbox;
mod token;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use constants::{
    DEFAULT_TOKEN_LIFETIME_SECS, DOCUMENTS_FOLDER, DOCUMENT_EXTENSIONS, LEGACY_DOCUMENTS_FOLDER,
    TOKEN_REFRESH_BUFFER_SECS,
};
pub use documents::{DocumentDeletion, DocumentLookup, DocumentStore};
pub use dropbox::{AccountInfo, DropboxClient, DropboxEndpoints, RemoteEntry, WriteMode};
pub use token::{
    CachedToken, Clock, DropboxOAuth, OAuthSecrets, SystemClock, TokenCache, TokenExchange,
    TokenGrant,
};

/// Errors that can occur while talking to remote storage
#[derive(Debug, thiserror::Error)]
pub enum CloudError {
    /// One or more OAuth secrets are missing; remote storage is disabled
    #[error("remote storage is not configured: {0}")]
    Configuration(String),

    /// The refresh-token exchange failed
    #[error("access token refresh failed: {0}")]
    TokenRefresh(String),

    /// The storage API answered with a non-success status
    #[error("remote storage API error ({status}): {summary}")]
    RemoteApi { status: u16, summary: String },

    /// The storage API answered with a body we could not interpret
    #[error("invalid response from remote storage: {0}")]
    InvalidResponse(String),

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error reading a local file for upload
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CloudError {
    /// Operator-facing hint for fixing the failure, where one is known.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            CloudError::Configuration(_) => Some(
                "set DROPBOX_APP_KEY, DROPBOX_APP_SECRET and DROPBOX_REFRESH_TOKEN to enable remote storage",
            ),
            CloudError::TokenRefresh(_) => Some(
                "regenerate the refresh token in the Dropbox app console and update DROPBOX_REFRESH_TOKEN",
            ),
            CloudError::RemoteApi { status: 401, .. } => {
                Some("the access token was rejected; try POST /admin/backup/refresh-token")
            }
            CloudError::RemoteApi { status: 429, .. } => {
                Some("remote storage is rate limiting requests; retry later")
            }
            CloudError::Http(_) => Some("check network connectivity to the remote storage API"),
            _ => None,
        }
    }

    /// True when the remote API reported that a path does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::RemoteApi { status: 409, summary } if summary.contains("not_found"))
    }
}

/// Result type for remote storage operations.
pub type CloudResult<T> = Result<T, CloudError>;
