//! # Consent Core
//!
//! Business logic shared by the consent endpoint, the admin panel and the
//! operator CLI:
//! - Consent responses in SQLite, one per participant
//! - Staff credentials and patient lists loaded from CSV
//! - Admin sessions
//! - Research-team notifications
//! - Backup layers and the production job schedule
//!
//! **No API concerns**: routing, cookies and HTTP status mapping belong in
//! `api-consent`, `api-admin` and `api-shared`.

pub mod backup;
pub mod config;
pub mod consent;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod notify;
pub mod records;
pub mod schedule;
pub mod session;
pub mod validation;

pub use backup::{BackupService, BackupStatus, FullBackupReport, OperationOutcome};
pub use config::{AppConfig, Environment, SmtpConfig};
pub use consent::{ConsentResponse, ConsentStore};
pub use credentials::{CredentialStore, PublicUser, Role};
pub use error::{CoreError, CoreResult};
pub use notify::{Notifier, NoopNotifier, SmtpNotifier};
pub use records::{PatientRecord, RecordStore, SortDirection};
pub use session::{Session, SessionStore};

use consent_cloud::{DocumentStore, DropboxClient, DropboxEndpoints, TokenCache};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Every long-lived service, built once from [`AppConfig`] at startup.
///
/// Cloning is cheap; all members are shared handles.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub consent: Arc<ConsentStore>,
    pub notifier: Arc<dyn Notifier>,
    pub credentials: Arc<RwLock<CredentialStore>>,
    pub records: Arc<RwLock<RecordStore>>,
    pub sessions: SessionStore,
    pub documents: DocumentStore,
    pub backups: Arc<BackupService>,
}

impl AppContext {
    /// Opens the database, loads CSV data and wires up remote storage.
    ///
    /// A missing credentials file leaves the admin panel with no accounts
    /// rather than failing startup; the consent endpoint does not need it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or a CSV file exists
    /// but cannot be parsed.
    pub fn initialise(config: AppConfig) -> CoreResult<Self> {
        Self::initialise_with(config, DropboxEndpoints::default())
    }

    /// As [`AppContext::initialise`], against the given storage endpoints.
    pub fn initialise_with(config: AppConfig, endpoints: DropboxEndpoints) -> CoreResult<Self> {
        let consent = Arc::new(ConsentStore::open(config.database_path())?);
        let notifier = notify::notifier_from_config(config.smtp.as_ref());

        let credentials = match CredentialStore::load(&config.users_csv) {
            Ok(store) => store,
            Err(CoreError::FileRead { path, source }) => {
                tracing::warn!(
                    "credentials file {} unavailable ({}); admin login disabled",
                    path.display(),
                    source
                );
                CredentialStore::default()
            }
            Err(e) => return Err(e),
        };
        let credentials = Arc::new(RwLock::new(credentials));
        let records = Arc::new(RwLock::new(RecordStore::load_dir(&config.records_dir)?));

        let tokens = Arc::new(TokenCache::dropbox(config.dropbox.clone(), &endpoints)?);
        let documents = DocumentStore::new(DropboxClient::new(tokens, endpoints)?);

        let backups = Arc::new(BackupService::new(
            config.database_path.clone(),
            config.backup_dir.clone(),
            config.retention_days,
            consent.clone(),
            records.clone(),
            documents.clone(),
        ));

        let sessions = SessionStore::new(config.session_ttl_hours);

        Ok(Self {
            config: Arc::new(config),
            consent,
            notifier,
            credentials,
            records,
            sessions,
            documents,
            backups,
        })
    }

    /// Starts the production job schedule, if enabled for this environment.
    pub fn start_scheduled_jobs(&self) -> Vec<tokio::task::JoinHandle<()>> {
        if !self.config.scheduled_jobs_enabled() {
            tracing::info!("scheduled jobs disabled outside production");
            return Vec::new();
        }
        schedule::spawn_jobs(self.backups.clone(), self.sessions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn config_in(temp: &TempDir, extra: &[(&str, &str)]) -> AppConfig {
        let mut map: HashMap<String, String> = HashMap::new();
        map.insert(
            "DATABASE_PATH".into(),
            temp.path().join("consent.db").display().to_string(),
        );
        map.insert(
            "USERS_CSV".into(),
            temp.path().join("users.csv").display().to_string(),
        );
        map.insert(
            "RECORDS_DIR".into(),
            temp.path().join("lists").display().to_string(),
        );
        map.insert(
            "BACKUP_DIR".into(),
            temp.path().join("backups").display().to_string(),
        );
        for (k, v) in extra {
            map.insert(k.to_string(), v.to_string());
        }
        AppConfig::from_lookup(|key| map.get(key).cloned()).unwrap()
    }

    #[tokio::test]
    async fn initialise_tolerates_missing_csv_inputs() {
        let temp = TempDir::new().unwrap();
        let ctx = AppContext::initialise(config_in(&temp, &[])).unwrap();

        assert!(ctx.credentials.read().await.is_empty());
        assert_eq!(ctx.records.read().await.total(), 0);
        assert_eq!(ctx.consent.count().unwrap(), 0);
        assert!(!ctx.documents.is_configured());
        assert!(ctx.start_scheduled_jobs().is_empty());
    }

    #[tokio::test]
    async fn initialise_loads_users_and_lists() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("users.csv"),
            "username,password,name,language,role,list\nann,pw,Ann,en,staff,clinic\n",
        )
        .unwrap();
        std::fs::create_dir_all(temp.path().join("lists")).unwrap();
        std::fs::write(temp.path().join("lists").join("clinic.csv"), "id\nC1\n").unwrap();

        let ctx = AppContext::initialise(config_in(&temp, &[])).unwrap();
        assert_eq!(ctx.credentials.read().await.len(), 1);
        assert_eq!(ctx.records.read().await.records_for("clinic").len(), 1);
    }

    #[tokio::test]
    async fn production_starts_three_jobs() {
        let temp = TempDir::new().unwrap();
        let ctx =
            AppContext::initialise(config_in(&temp, &[("ENVIRONMENT", "production")])).unwrap();

        let jobs = ctx.start_scheduled_jobs();
        assert_eq!(jobs.len(), 3);
        for job in jobs {
            job.abort();
        }
    }
}
