//! Thin client for the Dropbox HTTP API.
//!
//! Only the calls the services need are implemented. Every call fetches its
//! bearer credential from the shared [`TokenCache`]; a 401 answer drops the
//! cached token and the call is retried once with a fresh one.

use crate::constants::{
    DROPBOX_API_URL, DROPBOX_CONTENT_URL, DROPBOX_TOKEN_URL, HTTP_CONNECT_TIMEOUT_SECS,
    HTTP_REQUEST_TIMEOUT_SECS,
};
use crate::token::TokenCache;
use crate::{CloudError, CloudResult};
use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Base URLs for the API, content and token hosts, plus the timeouts applied
/// to every request sent to them.
#[derive(Debug, Clone)]
pub struct DropboxEndpoints {
    pub api_url: String,
    pub content_url: String,
    pub token_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for DropboxEndpoints {
    fn default() -> Self {
        Self {
            api_url: DROPBOX_API_URL.into(),
            content_url: DROPBOX_CONTENT_URL.into(),
            token_url: DROPBOX_TOKEN_URL.into(),
            connect_timeout: Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl DropboxEndpoints {
    /// All three hosts served from one base URL (used for local stand-ins).
    pub fn single_host(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            api_url: base.into(),
            content_url: base.into(),
            token_url: format!("{base}/oauth2/token"),
            ..Self::default()
        }
    }

    /// HTTP client honouring the configured timeouts.
    pub(crate) fn http_client(&self) -> CloudResult<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .build()
            .map_err(CloudError::from)
    }
}

/// How an upload treats an existing file at the same path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Add,
    Overwrite,
}

impl WriteMode {
    fn as_str(self) -> &'static str {
        match self {
            WriteMode::Add => "add",
            WriteMode::Overwrite => "overwrite",
        }
    }
}

/// File or folder metadata as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    #[serde(rename = ".tag", default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    pub name: String,
    #[serde(default)]
    pub path_display: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub server_modified: Option<String>,
}

impl RemoteEntry {
    pub fn is_folder(&self) -> bool {
        self.tag.as_deref() == Some("folder")
    }
}

/// The account the refresh token belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    pub email: String,
    pub display_name: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error_summary: Option<String>,
}

#[derive(Deserialize)]
struct ListFolderPage {
    entries: Vec<RemoteEntry>,
    cursor: String,
    has_more: bool,
}

#[derive(Deserialize)]
struct TemporaryLink {
    link: String,
}

#[derive(Deserialize)]
struct DeleteResult {
    metadata: RemoteEntry,
}

#[derive(Deserialize)]
struct AccountBody {
    email: String,
    name: AccountName,
}

#[derive(Deserialize)]
struct AccountName {
    display_name: String,
}

/// Client for the remote storage API, sharing one token cache.
#[derive(Clone)]
pub struct DropboxClient {
    http: reqwest::Client,
    endpoints: Arc<DropboxEndpoints>,
    tokens: Arc<TokenCache>,
}

impl DropboxClient {
    pub fn new(tokens: Arc<TokenCache>, endpoints: DropboxEndpoints) -> CloudResult<Self> {
        Ok(Self {
            http: endpoints.http_client()?,
            endpoints: Arc::new(endpoints),
            tokens,
        })
    }

    pub fn tokens(&self) -> &Arc<TokenCache> {
        &self.tokens
    }

    /// Uploads `bytes` to `path`.
    pub async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        mode: WriteMode,
    ) -> CloudResult<RemoteEntry> {
        let url = format!("{}/2/files/upload", self.endpoints.content_url);
        let arg = json!({
            "path": path,
            "mode": mode.as_str(),
            "autorename": false,
            "mute": true,
        })
        .to_string();

        let response = self
            .authorised(|bearer| {
                self.http
                    .post(&url)
                    .bearer_auth(bearer)
                    .header("Dropbox-API-Arg", arg.as_str())
                    .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                    .body(bytes.clone())
            })
            .await?;

        tracing::info!("uploaded {} to remote storage", path);
        decode(response).await
    }

    /// Reads a local file and uploads it to `path`.
    pub async fn upload_file(
        &self,
        local: &Path,
        path: &str,
        mode: WriteMode,
    ) -> CloudResult<RemoteEntry> {
        let bytes = tokio::fs::read(local).await?;
        self.upload(path, bytes, mode).await
    }

    /// Metadata for `path`, or `None` when nothing exists there.
    pub async fn get_metadata(&self, path: &str) -> CloudResult<Option<RemoteEntry>> {
        match self.rpc("files/get_metadata", json!({ "path": path })).await {
            Ok(entry) => Ok(Some(entry)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Short-lived download link for a stored file.
    pub async fn temporary_link(&self, path: &str) -> CloudResult<String> {
        let link: TemporaryLink = self
            .rpc("files/get_temporary_link", json!({ "path": path }))
            .await?;
        Ok(link.link)
    }

    /// Deletes `path`. Returns `false` when there was nothing to delete.
    pub async fn delete(&self, path: &str) -> CloudResult<bool> {
        match self
            .rpc::<DeleteResult>("files/delete_v2", json!({ "path": path }))
            .await
        {
            Ok(result) => {
                tracing::info!(
                    "deleted {} from remote storage",
                    result.metadata.path_display.as_deref().unwrap_or(path)
                );
                Ok(true)
            }
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Lists a folder, following pagination. A missing folder lists as empty.
    pub async fn list_folder(&self, path: &str, recursive: bool) -> CloudResult<Vec<RemoteEntry>> {
        let first: ListFolderPage = match self
            .rpc(
                "files/list_folder",
                json!({ "path": path, "recursive": recursive }),
            )
            .await
        {
            Ok(page) => page,
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut entries = first.entries;
        let mut cursor = first.cursor;
        let mut has_more = first.has_more;
        while has_more {
            let page: ListFolderPage = self
                .rpc("files/list_folder/continue", json!({ "cursor": cursor }))
                .await?;
            entries.extend(page.entries);
            cursor = page.cursor;
            has_more = page.has_more;
        }

        Ok(entries)
    }

    /// The account behind the configured refresh token.
    pub async fn current_account(&self) -> CloudResult<AccountInfo> {
        let body: AccountBody = self
            .rpc("users/get_current_account", serde_json::Value::Null)
            .await?;
        Ok(AccountInfo {
            email: body.email,
            display_name: body.name.display_name,
        })
    }

    async fn rpc<T: DeserializeOwned>(&self, route: &str, body: serde_json::Value) -> CloudResult<T> {
        let url = format!("{}/2/{}", self.endpoints.api_url, route);
        let response = self
            .authorised(|bearer| self.http.post(&url).bearer_auth(bearer).json(&body))
            .await?;
        decode(response).await
    }

    async fn authorised<F>(&self, build: F) -> CloudResult<Response>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.tokens.get_valid_token().await?;
        let response = build(token.expose_secret()).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check(response).await;
        }

        tracing::warn!("remote storage rejected the cached access token; refreshing");
        self.tokens.invalidate().await;
        let token = self.tokens.get_valid_token().await?;
        let response = build(token.expose_secret()).send().await?;
        check(response).await
    }
}

async fn check(response: Response) -> CloudResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let summary = serde_json::from_str::<ApiErrorBody>(&text)
        .ok()
        .and_then(|b| b.error_summary)
        .unwrap_or(text);

    Err(CloudError::RemoteApi {
        status: status.as_u16(),
        summary,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> CloudResult<T> {
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| CloudError::InvalidResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDropbox;

    #[tokio::test]
    async fn upload_then_metadata_and_delete() {
        let fake = FakeDropbox::start().await;
        let client = fake.client();

        let entry = client
            .upload("/backups/a.txt", b"hello".to_vec(), WriteMode::Add)
            .await
            .unwrap();
        assert_eq!(entry.name, "a.txt");
        assert_eq!(entry.size, Some(5));

        let meta = client.get_metadata("/backups/a.txt").await.unwrap();
        assert!(meta.is_some());
        assert!(client.get_metadata("/backups/missing.txt").await.unwrap().is_none());

        assert!(client.delete("/backups/a.txt").await.unwrap());
        assert!(!client.delete("/backups/a.txt").await.unwrap());
        assert_eq!(fake.token_requests(), 1);
    }

    #[tokio::test]
    async fn add_mode_conflicts_on_existing_path() {
        let fake = FakeDropbox::start().await;
        let client = fake.client();

        client
            .upload("/x/file.bin", vec![1, 2, 3], WriteMode::Add)
            .await
            .unwrap();
        let err = client
            .upload("/x/file.bin", vec![4], WriteMode::Add)
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::RemoteApi { status: 409, .. }));

        client
            .upload("/x/file.bin", vec![4], WriteMode::Overwrite)
            .await
            .unwrap();
        assert_eq!(fake.stored("/x/file.bin"), Some(vec![4]));
    }

    #[tokio::test]
    async fn list_folder_filters_by_prefix_and_tolerates_missing() {
        let fake = FakeDropbox::start().await;
        let client = fake.client();

        client.upload("/backups/db/one.db", vec![0], WriteMode::Add).await.unwrap();
        client.upload("/backups/csv/two.csv", vec![0], WriteMode::Add).await.unwrap();
        client.upload("/other/three", vec![0], WriteMode::Add).await.unwrap();

        let mut names: Vec<String> = client
            .list_folder("/backups", true)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["one.db", "two.csv"]);

        assert!(client.list_folder("/nowhere", false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejected_token_is_refreshed_once() {
        let fake = FakeDropbox::start().await;
        let client = fake.client();

        client.current_account().await.unwrap();
        fake.revoke_tokens();

        let account = client.current_account().await.unwrap();
        assert_eq!(account.email, "research@example.org");
        assert_eq!(fake.token_requests(), 2);
    }

    #[tokio::test]
    async fn silent_host_fails_after_the_request_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let endpoints = DropboxEndpoints {
            request_timeout: Duration::from_millis(200),
            ..DropboxEndpoints::single_host(&base)
        };
        let tokens = Arc::new(
            TokenCache::dropbox(Some(FakeDropbox::secrets()), &endpoints).unwrap(),
        );
        let client = DropboxClient::new(tokens, endpoints).unwrap();

        let err = tokio::time::timeout(Duration::from_secs(10), client.get_metadata("/a"))
            .await
            .expect("request timeout fires before the guard")
            .unwrap_err();
        assert!(matches!(err, CloudError::TokenRefresh(_)));
    }

    #[test]
    fn default_endpoints_carry_bounded_timeouts() {
        let endpoints = DropboxEndpoints::single_host("http://127.0.0.1:1/");
        assert_eq!(endpoints.connect_timeout, Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS));
        assert_eq!(endpoints.request_timeout, Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS));
        assert_eq!(endpoints.token_url, "http://127.0.0.1:1/oauth2/token");
    }

    #[tokio::test]
    async fn unconfigured_client_reports_configuration_error() {
        let fake = FakeDropbox::start().await;
        let client = fake.unconfigured_client();

        let err = client.get_metadata("/a").await.unwrap_err();
        assert!(matches!(err, CloudError::Configuration(_)));
        assert!(err.hint().is_some());
        assert_eq!(fake.token_requests(), 0);
    }
}
