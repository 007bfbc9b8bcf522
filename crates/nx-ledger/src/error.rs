// error.rs - Error types for the session ledger, snapshots, and undo.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: String,
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// A stored timestamp could not be parsed back.
    #[error("corrupt timestamp in ledger: {0}")]
    CorruptTimestamp(String),

    #[error("snapshot not found: {0}")]
    SnapshotNotFound(String),

    /// A snapshot blob no longer matches the hash it is stored under.
    #[error("snapshot blob {hash} is corrupt (content hashes to {actual})")]
    BlobCorrupt { hash: String, actual: String },

    #[error("git error: {0}")]
    Git(String),
}

impl LedgerError {
    pub(crate) fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        LedgerError::IoError {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}
