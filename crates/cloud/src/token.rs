//! Bearer credential cache for the remote storage API.
//!
//! The cache holds exactly one access token and the instant it expires. A
//! token is served only while `now <= expires_at - TOKEN_REFRESH_BUFFER_SECS`;
//! after that the next caller performs a refresh exchange and the cached value
//! is replaced as a whole.

use crate::constants::{DEFAULT_TOKEN_LIFETIME_SECS, TOKEN_REFRESH_BUFFER_SECS};
use crate::dropbox::DropboxEndpoints;
use crate::{CloudError, CloudResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tokio::sync::Mutex;

/// The three long-lived secrets needed to mint access tokens.
#[derive(Clone)]
pub struct OAuthSecrets {
    app_key: String,
    app_secret: SecretString,
    refresh_token: SecretString,
}

impl OAuthSecrets {
    /// Builds the secret set, failing with the names of any missing values.
    ///
    /// Blank values count as missing.
    pub fn from_parts(
        app_key: Option<String>,
        app_secret: Option<String>,
        refresh_token: Option<String>,
    ) -> CloudResult<Self> {
        fn present(v: Option<String>) -> Option<String> {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        }

        let app_key = present(app_key);
        let app_secret = present(app_secret);
        let refresh_token = present(refresh_token);

        let mut missing = Vec::new();
        if app_key.is_none() {
            missing.push("DROPBOX_APP_KEY");
        }
        if app_secret.is_none() {
            missing.push("DROPBOX_APP_SECRET");
        }
        if refresh_token.is_none() {
            missing.push("DROPBOX_REFRESH_TOKEN");
        }

        match (app_key, app_secret, refresh_token) {
            (Some(app_key), Some(app_secret), Some(refresh_token)) => Ok(Self {
                app_key,
                app_secret: SecretString::new(app_secret),
                refresh_token: SecretString::new(refresh_token),
            }),
            _ => Err(CloudError::Configuration(format!(
                "missing {}",
                missing.join(", ")
            ))),
        }
    }

    pub fn app_key(&self) -> &str {
        &self.app_key
    }
}

impl std::fmt::Debug for OAuthSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthSecrets")
            .field("app_key", &self.app_key)
            .field("app_secret", &"[redacted]")
            .field("refresh_token", &"[redacted]")
            .finish()
    }
}

/// A freshly minted access token.
pub struct TokenGrant {
    pub access_token: SecretString,
    /// Lifetime in seconds, when the endpoint reports one.
    pub expires_in: Option<i64>,
}

/// Performs the refresh-token exchange against an authorisation endpoint.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange(&self, secrets: &OAuthSecrets) -> CloudResult<TokenGrant>;
}

/// Source of the current time; replaced in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Refresh exchange against the Dropbox OAuth2 token endpoint.
pub struct DropboxOAuth {
    http: reqwest::Client,
    token_url: String,
}

impl DropboxOAuth {
    pub fn new(http: reqwest::Client, token_url: impl Into<String>) -> Self {
        Self {
            http,
            token_url: token_url.into(),
        }
    }
}

#[derive(serde::Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[async_trait]
impl TokenExchange for DropboxOAuth {
    async fn exchange(&self, secrets: &OAuthSecrets) -> CloudResult<TokenGrant> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", secrets.refresh_token.expose_secret().as_str()),
                ("client_id", secrets.app_key.as_str()),
                ("client_secret", secrets.app_secret.expose_secret().as_str()),
            ])
            .send()
            .await
            .map_err(|e| CloudError::TokenRefresh(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CloudError::TokenRefresh(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let body: TokenEndpointResponse = response
            .json()
            .await
            .map_err(|e| CloudError::TokenRefresh(format!("unreadable token response: {e}")))?;

        Ok(TokenGrant {
            access_token: SecretString::new(body.access_token),
            expires_in: body.expires_in,
        })
    }
}

/// The single cached credential.
#[derive(Clone)]
pub struct CachedToken {
    token: SecretString,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// True while the token has more than the refresh buffer left.
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at - Duration::seconds(TOKEN_REFRESH_BUFFER_SECS)
    }
}

/// Process-wide holder of the remote storage access token.
///
/// Constructed once at startup and shared behind an `Arc` by every component
/// that talks to remote storage.
pub struct TokenCache {
    secrets: Option<OAuthSecrets>,
    exchange: Arc<dyn TokenExchange>,
    clock: Arc<dyn Clock>,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(
        secrets: Option<OAuthSecrets>,
        exchange: Arc<dyn TokenExchange>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            secrets,
            exchange,
            clock,
            cached: Mutex::new(None),
        }
    }

    /// Cache backed by the Dropbox token endpoint and the system clock.
    pub fn dropbox(
        secrets: Option<OAuthSecrets>,
        endpoints: &DropboxEndpoints,
    ) -> CloudResult<Self> {
        let exchange = DropboxOAuth::new(endpoints.http_client()?, endpoints.token_url.clone());
        Ok(Self::new(secrets, Arc::new(exchange), Arc::new(SystemClock)))
    }

    /// Whether all OAuth secrets were supplied.
    pub fn is_configured(&self) -> bool {
        self.secrets.is_some()
    }

    fn secrets(&self) -> CloudResult<&OAuthSecrets> {
        self.secrets.as_ref().ok_or_else(|| {
            CloudError::Configuration(
                "DROPBOX_APP_KEY, DROPBOX_APP_SECRET and DROPBOX_REFRESH_TOKEN must all be set"
                    .into(),
            )
        })
    }

    /// Returns a bearer token valid for at least the refresh buffer.
    ///
    /// # Errors
    ///
    /// - `CloudError::Configuration` if any OAuth secret is missing
    /// - `CloudError::TokenRefresh` if a needed refresh fails; the cached value
    ///   is left as it was
    pub async fn get_valid_token(&self) -> CloudResult<SecretString> {
        let secrets = self.secrets()?;
        let mut cached = self.cached.lock().await;

        let now = self.clock.now();
        if let Some(token) = cached.as_ref().filter(|t| t.is_usable_at(now)) {
            return Ok(token.token.clone());
        }

        self.refresh_into(secrets, &mut cached).await
    }

    /// Mints a new token regardless of the cached one's expiry.
    ///
    /// On failure the previous cached value is kept, so a transient network
    /// error never discards a token that is still good.
    pub async fn force_refresh(&self) -> CloudResult<SecretString> {
        let secrets = self.secrets()?;
        let mut cached = self.cached.lock().await;
        self.refresh_into(secrets, &mut cached).await
    }

    /// Drops the cached token so the next caller refreshes.
    ///
    /// Used after the storage API rejects a token it had not yet expired.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    /// Expiry of the cached token, if any.
    pub async fn cached_expiry(&self) -> Option<DateTime<Utc>> {
        self.cached.lock().await.as_ref().map(CachedToken::expires_at)
    }

    async fn refresh_into(
        &self,
        secrets: &OAuthSecrets,
        slot: &mut Option<CachedToken>,
    ) -> CloudResult<SecretString> {
        tracing::info!("refreshing remote storage access token");

        let grant = match self.exchange.exchange(secrets).await {
            Ok(grant) => grant,
            Err(e) => {
                tracing::warn!("access token refresh failed: {}", e);
                return Err(e);
            }
        };

        let lifetime = grant
            .expires_in
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        let fresh = CachedToken {
            token: grant.access_token,
            expires_at: self.clock.now() + Duration::seconds(lifetime),
        };
        let token = fresh.token.clone();
        tracing::debug!("access token valid until {}", fresh.expires_at);
        *slot = Some(fresh);

        Ok(token)
    }
}
