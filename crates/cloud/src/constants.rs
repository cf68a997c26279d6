/// Refresh the bearer credential once it is this close to expiry.
pub const TOKEN_REFRESH_BUFFER_SECS: i64 = 5 * 60;

/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 4 * 60 * 60;

/// Folder holding identity documents.
pub const DOCUMENTS_FOLDER: &str = "/identity-documents";

/// Folder used by earlier deployments; still searched on lookup and delete.
pub const LEGACY_DOCUMENTS_FOLDER: &str = "/documents";

/// File extensions a stored document may carry, in lookup order.
pub const DOCUMENT_EXTENSIONS: [&str; 4] = ["pdf", "jpg", "jpeg", "png"];

/// Limit on establishing a connection to any remote storage host.
pub const HTTP_CONNECT_TIMEOUT_SECS: u64 = 15;

/// Limit on a whole request, including reading the response body.
pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 60;

pub(crate) const DROPBOX_API_URL: &str = "https://api.dropboxapi.com";
pub(crate) const DROPBOX_CONTENT_URL: &str = "https://content.dropboxapi.com";
pub(crate) const DROPBOX_TOKEN_URL: &str = "https://api.dropboxapi.com/oauth2/token";
