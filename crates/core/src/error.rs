use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("a consent response for participant {0} has already been recorded")]
    DuplicateParticipant(String),
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("failed to read file {path}: {source}", path = path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {path}: {source}", path = path.display())]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("database file not found: {}", .0.display())]
    DatabaseMissing(PathBuf),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("stored timestamp is invalid: {0}")]
    InvalidTimestamp(String),
    #[error("remote storage error: {0}")]
    Cloud(#[from] consent_cloud::CloudError),
    #[error("failed to send notification: {0}")]
    Notification(String),
    #[error("background task failed: {0}")]
    Background(String),
}

impl CoreError {
    /// Operator-facing hint, where one is known.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            CoreError::Cloud(e) => e.hint(),
            CoreError::DatabaseMissing(_) => Some("check DATABASE_PATH points at the consent database"),
            CoreError::FileWrite { .. } => Some("check BACKUP_DIR exists and is writable"),
            _ => None,
        }
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
