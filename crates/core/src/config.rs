//! Runtime configuration.
//!
//! Every setting is resolved once at process startup into [`AppConfig`] and
//! then passed into services. Nothing reads the process environment during
//! request handling.

use crate::constants::{
    DEFAULT_ADMIN_ADDR, DEFAULT_BACKUP_DIR, DEFAULT_CONSENT_ADDR, DEFAULT_DATABASE_PATH,
    DEFAULT_RECORDS_DIR, DEFAULT_RETENTION_DAYS, DEFAULT_SESSION_TTL_HOURS, DEFAULT_SMTP_PORT,
    DEFAULT_SUBMIT_RATE_LIMIT, DEFAULT_USERS_CSV, MAX_SESSION_TTL_HOURS,
};
use crate::{CoreError, CoreResult};
use consent_cloud::OAuthSecrets;
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Deployment environment; scheduled jobs and cookie hardening key off it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

impl FromStr for Environment {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "dev" | "development" | "test" => Ok(Environment::Development),
            "prod" | "production" => Ok(Environment::Production),
            other => Err(CoreError::InvalidConfig(format!(
                "ENVIRONMENT must be development or production, got '{other}'"
            ))),
        }
    }
}

/// Outgoing mail settings for research-team notifications.
#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from: String,
    pub to: String,
}

/// Configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub environment: Environment,
    pub consent_addr: String,
    pub admin_addr: String,
    pub database_path: PathBuf,
    pub backup_dir: PathBuf,
    pub retention_days: u32,
    pub users_csv: PathBuf,
    pub records_dir: PathBuf,
    pub allowed_origins: Vec<String>,
    pub submit_token: Option<SecretString>,
    pub submit_rate_limit: u32,
    pub session_ttl_hours: i64,
    pub smtp: Option<SmtpConfig>,
    pub dropbox: Option<OAuthSecrets>,
}

impl AppConfig {
    /// Reads configuration from the process environment.
    pub fn from_env() -> CoreResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    ///
    /// Blank values are treated as unset. Incomplete SMTP or Dropbox settings
    /// disable that feature with a warning instead of failing startup.
    pub fn from_lookup<F>(lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let environment = get("ENVIRONMENT")
            .map(|v| v.parse::<Environment>())
            .transpose()?
            .unwrap_or(Environment::Development);

        let smtp = smtp_from(&get);
        let dropbox = match OAuthSecrets::from_parts(
            get("DROPBOX_APP_KEY"),
            get("DROPBOX_APP_SECRET"),
            get("DROPBOX_REFRESH_TOKEN"),
        ) {
            Ok(secrets) => Some(secrets),
            Err(e) => {
                tracing::warn!("remote storage disabled: {}", e);
                None
            }
        };

        let allowed_origins = get("ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|o| o.trim().trim_end_matches('/').to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            environment,
            consent_addr: get("CONSENT_ADDR").unwrap_or_else(|| DEFAULT_CONSENT_ADDR.into()),
            admin_addr: get("ADMIN_ADDR").unwrap_or_else(|| DEFAULT_ADMIN_ADDR.into()),
            database_path: get("DATABASE_PATH")
                .unwrap_or_else(|| DEFAULT_DATABASE_PATH.into())
                .into(),
            backup_dir: get("BACKUP_DIR")
                .unwrap_or_else(|| DEFAULT_BACKUP_DIR.into())
                .into(),
            retention_days: parse_or("BACKUP_RETENTION_DAYS", get("BACKUP_RETENTION_DAYS"), DEFAULT_RETENTION_DAYS)?,
            users_csv: get("USERS_CSV")
                .unwrap_or_else(|| DEFAULT_USERS_CSV.into())
                .into(),
            records_dir: get("RECORDS_DIR")
                .unwrap_or_else(|| DEFAULT_RECORDS_DIR.into())
                .into(),
            allowed_origins,
            submit_token: get("SUBMIT_TOKEN").map(SecretString::new),
            submit_rate_limit: parse_or("SUBMIT_RATE_LIMIT", get("SUBMIT_RATE_LIMIT"), DEFAULT_SUBMIT_RATE_LIMIT)?,
            session_ttl_hours: session_ttl_hours(get("SESSION_TTL_HOURS"))?,
            smtp,
            dropbox,
        })
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Scheduled jobs only run in production.
    pub fn scheduled_jobs_enabled(&self) -> bool {
        self.environment.is_production()
    }
}

fn parse_or<T>(key: &str, value: Option<String>, default: T) -> CoreResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|e| CoreError::InvalidConfig(format!("{key}: invalid value '{v}': {e}"))),
    }
}

fn session_ttl_hours(value: Option<String>) -> CoreResult<i64> {
    let hours = parse_or("SESSION_TTL_HOURS", value, DEFAULT_SESSION_TTL_HOURS)?;
    if !(1..=MAX_SESSION_TTL_HOURS).contains(&hours) {
        return Err(CoreError::InvalidConfig(format!(
            "SESSION_TTL_HOURS: {hours} is outside 1..={MAX_SESSION_TTL_HOURS}"
        )));
    }
    Ok(hours)
}

fn smtp_from(get: &dyn Fn(&str) -> Option<String>) -> Option<SmtpConfig> {
    let host = get("SMTP_HOST");
    let username = get("SMTP_USER");
    let password = get("SMTP_PASS");
    let to = get("RESEARCH_TEAM_EMAIL");

    match (host, username, password, to) {
        (Some(host), Some(username), Some(password), Some(to)) => {
            let port = match get("SMTP_PORT").map(|p| p.parse::<u16>()) {
                Some(Ok(port)) => port,
                Some(Err(e)) => {
                    tracing::warn!("SMTP_PORT is invalid ({}); using {}", e, DEFAULT_SMTP_PORT);
                    DEFAULT_SMTP_PORT
                }
                None => DEFAULT_SMTP_PORT,
            };
            Some(SmtpConfig {
                host,
                port,
                from: get("MAIL_FROM").unwrap_or_else(|| username.clone()),
                username,
                password: SecretString::new(password),
                to,
            })
        }
        _ => {
            tracing::warn!("SMTP settings incomplete; consent notifications disabled");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> CoreResult<AppConfig> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.environment, Environment::Development);
        assert_eq!(cfg.consent_addr, DEFAULT_CONSENT_ADDR);
        assert_eq!(cfg.retention_days, DEFAULT_RETENTION_DAYS);
        assert!(cfg.smtp.is_none());
        assert!(cfg.dropbox.is_none());
        assert!(cfg.submit_token.is_none());
        assert!(!cfg.scheduled_jobs_enabled());
    }

    #[test]
    fn production_enables_scheduled_jobs() {
        let cfg = config(&[("ENVIRONMENT", "Production")]).unwrap();
        assert!(cfg.scheduled_jobs_enabled());
        assert!(config(&[("ENVIRONMENT", "staging")]).is_err());
    }

    #[test]
    fn session_ttl_must_be_in_range() {
        assert_eq!(config(&[("SESSION_TTL_HOURS", "12")]).unwrap().session_ttl_hours, 12);
        assert_eq!(config(&[]).unwrap().session_ttl_hours, DEFAULT_SESSION_TTL_HOURS);

        for bad in ["0", "-4", "8761", "9223372036854775807", "soon"] {
            let err = config(&[("SESSION_TTL_HOURS", bad)]).unwrap_err();
            assert!(matches!(err, CoreError::InvalidConfig(_)), "{bad} accepted");
        }
    }

    #[test]
    fn origins_are_split_and_trimmed() {
        let cfg = config(&[(
            "ALLOWED_ORIGINS",
            "https://a.example/, https://b.example ,,",
        )])
        .unwrap();
        assert_eq!(
            cfg.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn smtp_requires_all_core_settings() {
        let partial = config(&[("SMTP_HOST", "smtp.example"), ("SMTP_USER", "u")]).unwrap();
        assert!(partial.smtp.is_none());

        let full = config(&[
            ("SMTP_HOST", "smtp.example"),
            ("SMTP_USER", "bot@example.org"),
            ("SMTP_PASS", "pw"),
            ("RESEARCH_TEAM_EMAIL", "team@example.org"),
        ])
        .unwrap();
        let smtp = full.smtp.unwrap();
        assert_eq!(smtp.port, DEFAULT_SMTP_PORT);
        assert_eq!(smtp.from, "bot@example.org");
    }

    #[test]
    fn dropbox_secrets_need_all_three() {
        let cfg = config(&[("DROPBOX_APP_KEY", "k"), ("DROPBOX_APP_SECRET", "s")]).unwrap();
        assert!(cfg.dropbox.is_none());

        let cfg = config(&[
            ("DROPBOX_APP_KEY", "k"),
            ("DROPBOX_APP_SECRET", "s"),
            ("DROPBOX_REFRESH_TOKEN", "r"),
        ])
        .unwrap();
        assert!(cfg.dropbox.is_some());
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        assert!(config(&[("BACKUP_RETENTION_DAYS", "ten")]).is_err());
        let cfg = config(&[("BACKUP_RETENTION_DAYS", "7")]).unwrap();
        assert_eq!(cfg.retention_days, 7);
    }
}
