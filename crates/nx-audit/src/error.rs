// error.rs - Error types for the audit subsystem.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("cannot open audit log {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Reading or appending a line failed after the log was opened.
    #[error("audit log I/O: {0}")]
    Io(#[from] std::io::Error),

    /// An entry did not serialize, or a stored line is not JSON.
    #[error("audit entry is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// `previous_hash` on `line` does not match the hash of the line before.
    #[error("hash chain broken at line {line}: expected {expected}, found {actual}")]
    IntegrityViolation {
        line: usize,
        expected: String,
        actual: String,
    },

    #[error("redaction pattern '{name}' does not compile: {reason}")]
    InvalidRedaction { name: String, reason: String },
}
