use std::io;
use std::path::{Path, PathBuf};

use cairn_types::Score;

/// Errors produced by data log operations.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// No record with this score is indexed.
    #[error("unknown score {0}")]
    NotFound(Score),

    /// The data file does not exist.
    #[error("data file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The data file already exists (exclusive create).
    #[error("data file already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// I/O failure, tagged with the operation and the file involved.
    #[error("{op} failed on {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Score plus payload does not fit the 4-byte length prefix.
    #[error("frame body of {len} bytes exceeds the u32 length prefix")]
    FrameTooLarge { len: u64 },

    /// The datalog has been closed.
    #[error("datalog is closed")]
    Closed,
}

/// Convenience alias used throughout the log crate.
pub type LogResult<T> = std::result::Result<T, LogError>;

/// Errors from decoding a persisted index snapshot.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("invalid snapshot magic: {0:?}")]
    InvalidMagic([u8; 4]),

    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),

    #[error("snapshot truncated: need {needed} bytes, have {actual}")]
    Truncated { needed: usize, actual: usize },

    #[error("snapshot checksum mismatch")]
    ChecksumMismatch,

    #[error("inconsistent snapshot: {0}")]
    Inconsistent(String),
}

/// Attach an operation name and path to an `io::Result`.
pub trait IoContext<T> {
    fn io_context(self, op: &'static str, path: &Path) -> LogResult<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn io_context(self, op: &'static str, path: &Path) -> LogResult<T> {
        self.map_err(|source| LogError::Io {
            op,
            path: path.to_path_buf(),
            source,
        })
    }
}
