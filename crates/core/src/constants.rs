//! Constants used throughout the consent core crate.
//!
//! Defaults for every setting read from the environment live here, alongside
//! file naming used by the backup layers.

/// Default listen address of the public consent service.
pub const DEFAULT_CONSENT_ADDR: &str = "0.0.0.0:3000";

/// Default listen address of the admin panel.
pub const DEFAULT_ADMIN_ADDR: &str = "0.0.0.0:3001";

/// Default path of the SQLite consent database.
pub const DEFAULT_DATABASE_PATH: &str = "data/consent.db";

/// Default directory for local database snapshots.
pub const DEFAULT_BACKUP_DIR: &str = "backups";

/// Default number of days local snapshots are kept.
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Default credentials file.
pub const DEFAULT_USERS_CSV: &str = "data/users.csv";

/// Default directory holding one `<list>.csv` per patient list.
pub const DEFAULT_RECORDS_DIR: &str = "data/lists";

/// Default SMTP submission port.
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// Default number of submissions allowed per client address per window.
pub const DEFAULT_SUBMIT_RATE_LIMIT: u32 = 20;

/// Length of the submission rate-limit window.
pub const SUBMIT_RATE_WINDOW_SECS: u64 = 15 * 60;

/// Default admin session lifetime.
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 8;

/// Longest admin session lifetime accepted from configuration.
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;

/// Field every patient record must carry.
pub const RECORD_ID_FIELD: &str = "id";

/// Prefix of every file written by the backup layers.
pub const BACKUP_FILE_PREFIX: &str = "consent";

/// Subdirectory of the backup dir used for files generated for upload.
pub const EXPORTS_DIR_NAME: &str = "exports";

/// Remote folder for CSV exports.
pub const REMOTE_CSV_FOLDER: &str = "/backups/csv";

/// Remote folder for database exports.
pub const REMOTE_DB_FOLDER: &str = "/backups/db";

/// Remote root listed by the backup admin endpoints.
pub const REMOTE_BACKUP_ROOT: &str = "/backups";
