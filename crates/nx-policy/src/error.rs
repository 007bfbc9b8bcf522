// error.rs - Error types for the policy subsystem.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or compiling a policy.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The policy file could not be read.
    #[error("failed to read policy at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The policy file is not valid YAML for the document schema.
    #[error("invalid policy document at {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    /// A rule pattern could not be compiled.
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A redaction pattern carries a regex that does not compile.
    #[error("invalid redaction regex '{name}': {reason}")]
    InvalidRedaction { name: String, reason: String },
}
