use std::io;
use std::path::PathBuf;

use cairn_log::LogError;
use cairn_types::Score;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No value with this score has been written.
    #[error("score not found: {0}")]
    NotFound(Score),

    /// No data file exists for the named store.
    #[error("store not found: {0}")]
    StoreNotFound(String),

    /// A store with this name already exists.
    #[error("store already exists: {0}")]
    AlreadyExists(String),

    /// The name cannot be used as a file stem.
    #[error("invalid store name: {0:?}")]
    InvalidName(String),

    /// Bytes read back do not hash to the requested score.
    #[error("checksum failure for {score}: stored bytes hash to {computed}")]
    ChecksumFailure { score: Score, computed: Score },

    /// I/O failure, tagged with the operation and the file involved.
    #[error("{op} failed on {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The value is too large for a single record.
    #[error("value of {len} bytes is too large for one record")]
    TooLarge { len: u64 },

    /// The store has been closed or deleted.
    #[error("store is closed")]
    Closed,

    /// A thread panicked while holding the store lock.
    #[error("store lock poisoned")]
    Poisoned,

    /// The configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<LogError> for StoreError {
    fn from(err: LogError) -> Self {
        match err {
            LogError::NotFound(score) => Self::NotFound(score),
            LogError::FileNotFound(path) => Self::StoreNotFound(path.display().to_string()),
            LogError::AlreadyExists(path) => Self::AlreadyExists(path.display().to_string()),
            LogError::Io { op, path, source } => Self::Io { op, path, source },
            LogError::FrameTooLarge { len } => Self::TooLarge { len },
            LogError::Closed => Self::Closed,
        }
    }
}
