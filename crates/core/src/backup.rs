//! Backup orchestration for the consent database and patient lists.
//!
//! Three layers, each runnable on its own or in sequence via
//! [`BackupService::run_all`]:
//!
//! - local: consistent database snapshots in the backup directory, pruned by
//!   modification time
//! - csv: consent responses and patient list CSVs uploaded to remote storage
//! - db: a database copy uploaded to remote storage
//!
//! Remote layers without configuration report a failed [`OperationOutcome`]
//! carrying a hint; they never take the process down.
//!
//! File system and SQLite work runs on the blocking pool; the `_at` variants
//! are the synchronous cores those tasks call.

use crate::consent::ConsentStore;
use crate::constants::{
    BACKUP_FILE_PREFIX, EXPORTS_DIR_NAME, REMOTE_BACKUP_ROOT, REMOTE_CSV_FOLDER, REMOTE_DB_FOLDER,
};
use crate::records::RecordStore;
use crate::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use consent_cloud::{CloudError, DocumentStore, RemoteEntry};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Result of one backup or token operation, as reported to operators.
#[derive(Clone, Debug, Serialize)]
pub struct OperationOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl OperationOutcome {
    pub fn ok(message: impl Into<String>, details: impl Serialize) -> Self {
        Self {
            success: true,
            message: message.into(),
            error: None,
            hint: None,
            details: serde_json::to_value(details).unwrap_or(serde_json::Value::Null),
        }
    }

    pub fn failed(message: impl Into<String>, error: &CoreError) -> Self {
        Self {
            success: false,
            message: message.into(),
            error: Some(error.to_string()),
            hint: error.hint().map(str::to_string),
            details: serde_json::Value::Null,
        }
    }

    /// Wraps a labelled result, logging failures.
    pub fn from_result<T: Serialize>(label: &str, result: CoreResult<T>) -> Self {
        match result {
            Ok(details) => Self::ok(format!("{label} completed"), details),
            Err(e) => {
                tracing::error!("{} failed: {}", label, e);
                Self::failed(format!("{label} failed"), &e)
            }
        }
    }
}

/// A local snapshot just written.
#[derive(Clone, Debug, Serialize)]
pub struct SnapshotReport {
    pub file: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub sha256: String,
    pub removed: Vec<String>,
}

/// Files sent to remote storage by one export.
#[derive(Clone, Debug, Serialize)]
pub struct ExportReport {
    pub uploaded: Vec<String>,
    pub rows: Option<usize>,
}

/// Outcome of every layer of a full backup run.
#[derive(Clone, Debug, Serialize)]
pub struct FullBackupReport {
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub local: OperationOutcome,
    pub csv: OperationOutcome,
    pub database: OperationOutcome,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LocalBackup {
    pub name: String,
    pub size_bytes: u64,
    pub modified: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize)]
pub struct BackupStatus {
    pub backup_dir: PathBuf,
    pub retention_days: u32,
    pub local_backups: Vec<LocalBackup>,
    pub latest: Option<LocalBackup>,
    pub total_size_bytes: u64,
    pub consent_responses: u64,
    pub remote_configured: bool,
    pub token_expires_at: Option<DateTime<Utc>>,
}

/// Runs the backup layers against one database and records directory.
#[derive(Clone)]
pub struct BackupService {
    database_path: PathBuf,
    backup_dir: PathBuf,
    retention_days: u32,
    consent: Arc<ConsentStore>,
    records: Arc<RwLock<RecordStore>>,
    documents: DocumentStore,
}

impl BackupService {
    pub fn new(
        database_path: PathBuf,
        backup_dir: PathBuf,
        retention_days: u32,
        consent: Arc<ConsentStore>,
        records: Arc<RwLock<RecordStore>>,
        documents: DocumentStore,
    ) -> Self {
        Self {
            database_path,
            backup_dir,
            retention_days,
            consent,
            records,
            documents,
        }
    }

    pub fn retention_days(&self) -> u32 {
        self.retention_days
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Snapshots the database into the backup directory, then prunes old files.
    ///
    /// # Errors
    ///
    /// - `CoreError::DatabaseMissing` if the database file does not exist
    /// - `CoreError::FileWrite` if the backup directory cannot be created
    /// - `CoreError::Database` if SQLite cannot write the copy
    /// - `CoreError::Background` if the blocking task panicked
    pub async fn snapshot_local(&self) -> CoreResult<SnapshotReport> {
        self.blocking(|service| service.snapshot_local_at(Utc::now()))
            .await
    }

    pub fn snapshot_local_at(&self, now: DateTime<Utc>) -> CoreResult<SnapshotReport> {
        self.ensure_database()?;
        create_dir(&self.backup_dir)?;

        let target = unique_path(
            &self.backup_dir,
            &format!("{BACKUP_FILE_PREFIX}-{}", now.format("%Y-%m-%d_%H%M%S")),
            "db",
        );
        self.consent.snapshot_to(&target)?;

        let bytes = std::fs::read(&target).map_err(|source| CoreError::FileRead {
            path: target.clone(),
            source,
        })?;
        let sha256 = hex::encode(Sha256::digest(&bytes));
        let file = file_name(&target);
        tracing::info!("local backup written: {} ({} bytes)", file, bytes.len());

        let removed = self.cleanup_at(SystemTime::now(), self.retention_days)?;

        Ok(SnapshotReport {
            file,
            path: target,
            size_bytes: bytes.len() as u64,
            sha256,
            removed,
        })
    }

    /// Deletes backup files older than `retention_days`, returning their names.
    pub async fn cleanup(&self, retention_days: u32) -> CoreResult<Vec<String>> {
        self.blocking(move |service| service.cleanup_at(SystemTime::now(), retention_days))
            .await
    }

    /// Cleanup relative to `now`. A file exactly at the retention age is kept.
    pub fn cleanup_at(&self, now: SystemTime, retention_days: u32) -> CoreResult<Vec<String>> {
        let window = Duration::from_secs(u64::from(retention_days) * SECS_PER_DAY);
        let mut removed = Vec::new();

        for (path, metadata) in backup_files(&self.backup_dir)? {
            let Ok(modified) = metadata.modified() else {
                continue;
            };
            let age = now.duration_since(modified).unwrap_or_default();
            if age <= window {
                continue;
            }

            std::fs::remove_file(&path).map_err(|source| CoreError::FileWrite {
                path: path.clone(),
                source,
            })?;
            let name = file_name(&path);
            tracing::info!("removed expired backup {}", name);
            removed.push(name);
        }

        removed.sort();
        Ok(removed)
    }

    /// Uploads consent responses and every patient list as CSV.
    ///
    /// Files land under `/backups/csv/<date>/`. The local export file is
    /// removed afterwards whether or not the upload succeeded.
    pub async fn export_csv(&self) -> CoreResult<ExportReport> {
        self.require_remote()?;

        let now = Utc::now();
        let date = now.format("%Y-%m-%d").to_string();
        let exports = self.exports_dir()?;
        let local = exports.join(format!("{BACKUP_FILE_PREFIX}-{date}.csv"));

        let folder = format!("{REMOTE_CSV_FOLDER}/{date}");
        let remote = format!("{folder}/{}", file_name(&local));
        let result = async {
            let target = local.clone();
            let rows = self
                .blocking(move |service| {
                    let file = std::fs::File::create(&target).map_err(|source| {
                        CoreError::FileWrite {
                            path: target.clone(),
                            source,
                        }
                    })?;
                    service.consent.export_csv(file)
                })
                .await?;
            self.documents.upload_file(&local, &remote).await?;
            Ok::<_, CoreError>(rows)
        }
        .await;
        if local.exists() {
            remove_quietly(&local);
        }
        let rows = result?;

        let mut uploaded = vec![remote];

        let lists = self.records.read().await.csv_files();
        for list in lists {
            if !list.is_file() {
                tracing::warn!("patient list {} vanished before export", list.display());
                continue;
            }
            let remote = format!("{folder}/{}", file_name(&list));
            self.documents.upload_file(&list, &remote).await?;
            uploaded.push(remote);
        }

        tracing::info!("CSV export uploaded {} files to {}", uploaded.len(), folder);
        Ok(ExportReport {
            uploaded,
            rows: Some(rows),
        })
    }

    /// Uploads a consistent copy of the database to `/backups/db/`.
    pub async fn export_database(&self) -> CoreResult<ExportReport> {
        self.require_remote()?;
        self.ensure_database()?;

        let stamp = Utc::now().format("%Y-%m-%d_%H%M%S").to_string();
        let exports = self.exports_dir()?;
        let local = unique_path(&exports, &format!("{BACKUP_FILE_PREFIX}-{stamp}"), "db");

        let remote = format!("{REMOTE_DB_FOLDER}/{}", file_name(&local));
        let result = async {
            let target = local.clone();
            self.blocking(move |service| service.consent.snapshot_to(&target))
                .await?;
            self.documents.upload_file(&local, &remote).await?;
            Ok::<_, CoreError>(())
        }
        .await;
        if local.exists() {
            remove_quietly(&local);
        }
        result?;

        tracing::info!("database export uploaded to {}", remote);
        Ok(ExportReport {
            uploaded: vec![remote],
            rows: None,
        })
    }

    /// Runs local, csv and db layers in that order.
    ///
    /// A failing layer does not stop the later ones; `success` is true only
    /// when all three succeed.
    pub async fn run_all(&self) -> FullBackupReport {
        let started_at = Utc::now();
        tracing::info!("full backup started");

        let local = OperationOutcome::from_result("local backup", self.snapshot_local().await);
        let csv = OperationOutcome::from_result("CSV export", self.export_csv().await);
        let database =
            OperationOutcome::from_result("database export", self.export_database().await);

        let success = local.success && csv.success && database.success;
        tracing::info!("full backup finished (success: {})", success);

        FullBackupReport {
            success,
            started_at,
            finished_at: Utc::now(),
            local,
            csv,
            database,
        }
    }

    /// Local backups, newest first, with remote and token state.
    pub async fn status(&self) -> CoreResult<BackupStatus> {
        let (local_backups, consent_responses) = self
            .blocking(|service| {
                let local = local_backups(&service.backup_dir)?;
                Ok((local, service.consent.count()?))
            })
            .await?;

        let tokens = self.documents.client().tokens();
        Ok(BackupStatus {
            backup_dir: self.backup_dir.clone(),
            retention_days: self.retention_days,
            latest: local_backups.first().cloned(),
            total_size_bytes: local_backups.iter().map(|b| b.size_bytes).sum(),
            local_backups,
            consent_responses,
            remote_configured: tokens.is_configured(),
            token_expires_at: tokens.cached_expiry().await,
        })
    }

    /// Every file under the remote backup root.
    pub async fn list_remote(&self) -> CoreResult<Vec<RemoteEntry>> {
        self.require_remote()?;
        let mut entries: Vec<RemoteEntry> = self
            .documents
            .list(REMOTE_BACKUP_ROOT)
            .await?
            .into_iter()
            .filter(|e| !e.is_folder())
            .collect();
        entries.sort_by(|a, b| a.path_display.cmp(&b.path_display));
        Ok(entries)
    }

    /// Checks the refresh token works by fetching the account it belongs to.
    pub async fn validate_token(&self) -> OperationOutcome {
        let result: CoreResult<serde_json::Value> = async {
            self.require_remote()?;
            let account = self.documents.account().await?;
            let expires_at = self.documents.client().tokens().cached_expiry().await;
            Ok::<_, CoreError>(serde_json::json!({
                "account": account,
                "token_expires_at": expires_at,
            }))
        }
        .await;

        match result {
            Ok(details) => OperationOutcome::ok("refresh token is valid", details),
            Err(e) => {
                tracing::warn!("token validation failed: {}", e);
                OperationOutcome::failed("refresh token is not usable", &e)
            }
        }
    }

    /// Mints a new access token regardless of the cached one.
    pub async fn refresh_token(&self) -> OperationOutcome {
        let tokens = self.documents.client().tokens();
        let result: CoreResult<Option<DateTime<Utc>>> = async {
            tokens.force_refresh().await?;
            Ok::<_, CoreError>(tokens.cached_expiry().await)
        }
        .await;

        match result {
            Ok(expires_at) => OperationOutcome::ok(
                "access token refreshed",
                serde_json::json!({ "token_expires_at": expires_at }),
            ),
            Err(e) => {
                tracing::warn!("token refresh failed: {}", e);
                OperationOutcome::failed("access token refresh failed", &e)
            }
        }
    }

    /// Runs `work` on the blocking pool against a clone of this service.
    async fn blocking<T, F>(&self, work: F) -> CoreResult<T>
    where
        F: FnOnce(BackupService) -> CoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let service = self.clone();
        tokio::task::spawn_blocking(move || work(service))
            .await
            .map_err(|e| CoreError::Background(e.to_string()))?
    }

    fn require_remote(&self) -> CoreResult<()> {
        if self.documents.is_configured() {
            return Ok(());
        }
        Err(CloudError::Configuration(
            "DROPBOX_APP_KEY, DROPBOX_APP_SECRET and DROPBOX_REFRESH_TOKEN must all be set".into(),
        )
        .into())
    }

    fn ensure_database(&self) -> CoreResult<()> {
        if self.database_path.is_file() {
            Ok(())
        } else {
            Err(CoreError::DatabaseMissing(self.database_path.clone()))
        }
    }

    fn exports_dir(&self) -> CoreResult<PathBuf> {
        let dir = self.backup_dir.join(EXPORTS_DIR_NAME);
        create_dir(&dir)?;
        Ok(dir)
    }
}

fn create_dir(dir: &Path) -> CoreResult<()> {
    std::fs::create_dir_all(dir).map_err(|source| CoreError::FileWrite {
        path: dir.to_path_buf(),
        source,
    })
}

/// Regular, non-hidden files directly inside `dir`. A missing dir has none.
fn backup_files(dir: &Path) -> CoreResult<Vec<(PathBuf, std::fs::Metadata)>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(CoreError::FileRead {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut files = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if file_name(&path).starts_with('.') {
            continue;
        }
        match entry.metadata() {
            Ok(metadata) if metadata.is_file() => files.push((path, metadata)),
            _ => {}
        }
    }
    Ok(files)
}

/// Backup files in `dir`, newest first.
fn local_backups(dir: &Path) -> CoreResult<Vec<LocalBackup>> {
    let mut backups = Vec::new();
    for (path, metadata) in backup_files(dir)? {
        let modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        backups.push(LocalBackup {
            name: file_name(&path),
            size_bytes: metadata.len(),
            modified,
        });
    }
    backups.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.name.cmp(&a.name)));
    Ok(backups)
}

/// `<dir>/<stem>.<ext>`, or `<stem>-N.<ext>` if that name is taken.
fn unique_path(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    let mut candidate = dir.join(format!("{stem}.{ext}"));
    let mut n = 2;
    while candidate.exists() {
        candidate = dir.join(format!("{stem}-{n}.{ext}"));
        n += 1;
    }
    candidate
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn remove_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!("could not remove export file {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consent::ConsentResponse;
    use consent_cloud::testing::FakeDropbox;
    use consent_types::{ConsentDecision, ParticipantId};
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        root: PathBuf,
        service: BackupService,
    }

    fn fixture(documents: DocumentStore) -> Fixture {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        let db = root.join("data").join("consent.db");
        let consent = Arc::new(ConsentStore::open(&db).unwrap());
        consent
            .record(&ConsentResponse::new(
                ParticipantId::parse("P-1").unwrap(),
                ConsentDecision::Accept,
                None,
                None,
            ))
            .unwrap();

        let lists = root.join("lists");
        fs::create_dir_all(&lists).unwrap();
        fs::write(lists.join("clinic-a.csv"), "id,name\nA1,Ana\n").unwrap();
        let records = Arc::new(RwLock::new(RecordStore::load_dir(&lists).unwrap()));

        let service = BackupService::new(
            db,
            root.join("backups"),
            30,
            consent,
            records,
            documents,
        );
        Fixture {
            _temp: temp,
            root,
            service,
        }
    }

    fn touch_aged(path: &Path, now: SystemTime, days: u64) {
        fs::write(path, b"backup").unwrap();
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(now - Duration::from_secs(days * SECS_PER_DAY))
            .unwrap();
    }

    #[tokio::test]
    async fn cleanup_removes_only_files_past_retention() {
        let fake = FakeDropbox::start().await;
        let f = fixture(DocumentStore::new(fake.unconfigured_client()));
        let dir = f.service.backup_dir().to_path_buf();
        fs::create_dir_all(&dir).unwrap();

        let now = SystemTime::now();
        touch_aged(&dir.join("consent-old.db"), now, 10);
        touch_aged(&dir.join("consent-recent.db"), now, 3);

        let removed = f.service.cleanup_at(now, 7).unwrap();
        assert_eq!(removed, vec!["consent-old.db"]);
        assert!(!dir.join("consent-old.db").exists());
        assert!(dir.join("consent-recent.db").exists());
    }

    #[tokio::test]
    async fn cleanup_keeps_file_exactly_at_retention() {
        let fake = FakeDropbox::start().await;
        let f = fixture(DocumentStore::new(fake.unconfigured_client()));
        let dir = f.service.backup_dir().to_path_buf();
        fs::create_dir_all(&dir).unwrap();

        let path = dir.join("consent-edge.db");
        touch_aged(&path, SystemTime::now(), 7);
        let modified = fs::metadata(&path).unwrap().modified().unwrap();
        let now = modified + Duration::from_secs(7 * SECS_PER_DAY);

        assert!(f.service.cleanup_at(now, 7).unwrap().is_empty());
        assert_eq!(
            f.service.cleanup_at(now + Duration::from_secs(1), 7).unwrap(),
            vec!["consent-edge.db"]
        );
    }

    #[tokio::test]
    async fn cleanup_of_missing_directory_is_a_no_op() {
        let fake = FakeDropbox::start().await;
        let f = fixture(DocumentStore::new(fake.unconfigured_client()));
        assert!(f.service.cleanup(7).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn snapshot_writes_a_hashed_copy() {
        let fake = FakeDropbox::start().await;
        let f = fixture(DocumentStore::new(fake.unconfigured_client()));
        let now: DateTime<Utc> = "2025-03-04T05:06:07Z".parse().unwrap();

        let first = f.service.snapshot_local_at(now).unwrap();
        assert_eq!(first.file, "consent-2025-03-04_050607.db");
        assert_eq!(first.sha256.len(), 64);
        assert!(first.size_bytes > 0);

        let second = f.service.snapshot_local_at(now).unwrap();
        assert_eq!(second.file, "consent-2025-03-04_050607-2.db");

        let copy = ConsentStore::open(&first.path).unwrap();
        assert_eq!(copy.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn snapshot_without_database_fails() {
        let fake = FakeDropbox::start().await;
        let temp = TempDir::new().unwrap();
        let service = BackupService::new(
            temp.path().join("missing.db"),
            temp.path().join("backups"),
            30,
            Arc::new(ConsentStore::open_in_memory().unwrap()),
            Arc::new(RwLock::new(RecordStore::default())),
            DocumentStore::new(fake.unconfigured_client()),
        );

        let err = service.snapshot_local().await.unwrap_err();
        assert!(matches!(err, CoreError::DatabaseMissing(_)));
        assert!(err.hint().is_some());
    }

    #[tokio::test]
    async fn csv_export_uploads_responses_and_lists() {
        let fake = FakeDropbox::start().await;
        let f = fixture(DocumentStore::new(fake.client()));

        let report = f.service.export_csv().await.unwrap();
        let date = Utc::now().format("%Y-%m-%d").to_string();

        assert_eq!(report.rows, Some(1));
        assert_eq!(report.uploaded.len(), 2);
        let responses = fake
            .stored(&format!("/backups/csv/{date}/consent-{date}.csv"))
            .unwrap();
        assert!(String::from_utf8(responses).unwrap().contains("P-1,accept"));
        assert!(fake
            .stored(&format!("/backups/csv/{date}/clinic-a.csv"))
            .is_some());
        assert!(!f
            .root
            .join("backups")
            .join(EXPORTS_DIR_NAME)
            .join(format!("consent-{date}.csv"))
            .exists());
    }

    #[tokio::test]
    async fn failed_uploads_leave_no_export_files_behind() {
        let fake = FakeDropbox::start().await;
        let f = fixture(DocumentStore::new(fake.client()));
        fake.fail_uploads();

        assert!(f.service.export_csv().await.is_err());
        assert!(f.service.export_database().await.is_err());

        let exports = f.root.join("backups").join(EXPORTS_DIR_NAME);
        assert_eq!(fs::read_dir(&exports).unwrap().count(), 0);
        assert!(fake.paths().is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn local_work_leaves_the_runtime_thread_free() {
        let fake = FakeDropbox::start().await;
        let f = fixture(DocumentStore::new(fake.unconfigured_client()));

        let runtime_thread = std::thread::current().id();
        let worker_thread = f
            .service
            .blocking(|_| Ok(std::thread::current().id()))
            .await
            .unwrap();
        assert_ne!(worker_thread, runtime_thread);

        let report = f.service.snapshot_local().await.unwrap();
        assert!(report.path.is_file());
        assert_eq!(f.service.status().await.unwrap().local_backups.len(), 1);
    }

    #[tokio::test]
    async fn panicking_background_work_is_an_internal_error() {
        let fake = FakeDropbox::start().await;
        let f = fixture(DocumentStore::new(fake.unconfigured_client()));

        let err = f
            .service
            .blocking(|_| -> CoreResult<()> { panic!("disk went away") })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Background(_)));
    }

    #[tokio::test]
    async fn database_export_uploads_one_file() {
        let fake = FakeDropbox::start().await;
        let f = fixture(DocumentStore::new(fake.client()));

        let report = f.service.export_database().await.unwrap();
        assert_eq!(report.uploaded.len(), 1);
        assert!(report.uploaded[0].starts_with("/backups/db/consent-"));
        assert!(fake.stored(&report.uploaded[0]).is_some());

        let listed = f.service.list_remote().await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn full_run_reports_each_layer_without_remote_config() {
        let fake = FakeDropbox::start().await;
        let f = fixture(DocumentStore::new(fake.unconfigured_client()));

        let report = f.service.run_all().await;
        assert!(!report.success);
        assert!(report.local.success);
        assert!(!report.csv.success);
        assert!(!report.database.success);
        assert!(report.csv.hint.as_deref().unwrap().contains("DROPBOX_REFRESH_TOKEN"));
        assert_eq!(fake.token_requests(), 0);
    }

    #[tokio::test]
    async fn full_run_succeeds_with_remote() {
        let fake = FakeDropbox::start().await;
        let f = fixture(DocumentStore::new(fake.client()));

        let report = f.service.run_all().await;
        assert!(report.success, "{report:?}");
        assert_eq!(f.service.status().await.unwrap().local_backups.len(), 1);
    }

    #[tokio::test]
    async fn status_lists_newest_first() {
        let fake = FakeDropbox::start().await;
        let f = fixture(DocumentStore::new(fake.unconfigured_client()));
        let dir = f.service.backup_dir().to_path_buf();
        fs::create_dir_all(dir.join(EXPORTS_DIR_NAME)).unwrap();

        let now = SystemTime::now();
        touch_aged(&dir.join("consent-a.db"), now, 2);
        touch_aged(&dir.join("consent-b.db"), now, 1);
        touch_aged(&dir.join(".partial"), now, 0);

        let status = f.service.status().await.unwrap();
        let names: Vec<&str> = status.local_backups.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["consent-b.db", "consent-a.db"]);
        assert_eq!(status.latest.unwrap().name, "consent-b.db");
        assert_eq!(status.consent_responses, 1);
        assert!(!status.remote_configured);
        assert!(status.token_expires_at.is_none());
    }

    #[tokio::test]
    async fn token_checks_report_outcomes() {
        let fake = FakeDropbox::start().await;
        let f = fixture(DocumentStore::new(fake.client()));

        let valid = f.service.validate_token().await;
        assert!(valid.success);
        assert_eq!(valid.details["account"]["email"], "research@example.org");

        let refreshed = f.service.refresh_token().await;
        assert!(refreshed.success);
        assert_eq!(fake.token_requests(), 2);

        fake.fail_token_endpoint();
        let failed = f.service.refresh_token().await;
        assert!(!failed.success);
        assert!(failed.hint.unwrap().contains("regenerate the refresh token"));
    }

    #[tokio::test]
    async fn token_checks_without_config_give_hint() {
        let fake = FakeDropbox::start().await;
        let f = fixture(DocumentStore::new(fake.unconfigured_client()));

        let outcome = f.service.validate_token().await;
        assert!(!outcome.success);
        assert!(outcome.hint.is_some());
    }
}
