// error.rs - Runtime errors and their mapping onto the wire taxonomy.
//
// Handlers return `NexxonError`. Errors from the other Nexxon crates reach
// it through `From<RuntimeError>` or the `IntoNexxonError` conversions
// below; nothing untyped crosses the dispatch boundary.

use thiserror::Error;

use nx_audit::AuditError;
use nx_ledger::LedgerError;
use nx_policy::PolicyError;
use nx_protocol::{ErrorCode, NexxonError};
use nx_provider::{BreakerError, ProviderError, RegistryError};

/// Errors that can occur while building or running the runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Configuration could not be read or parsed.
    #[error("invalid configuration in {path}: {reason}")]
    Config { path: String, reason: String },

    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// The file scanner could not walk the project.
    #[error("file scan failed: {0}")]
    Scan(String),

    #[error("server error: {0}")]
    Server(String),
}

impl RuntimeError {
    pub(crate) fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        RuntimeError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

impl From<RuntimeError> for NexxonError {
    fn from(err: RuntimeError) -> Self {
        let code = match &err {
            RuntimeError::Scan(_) => ErrorCode::IndexCorrupt,
            _ => ErrorCode::RuntimeError,
        };
        NexxonError::new(code, err.to_string())
    }
}

/// Conversion of another crate's error into the wire error.
pub trait IntoNexxonError {
    fn into_nexxon(self) -> NexxonError;
}

impl IntoNexxonError for ProviderError {
    fn into_nexxon(self) -> NexxonError {
        let code = match &self {
            ProviderError::Timeout { .. } => ErrorCode::ProviderTimeout,
            ProviderError::Unavailable { .. } => ErrorCode::ProviderUnavailable,
            ProviderError::Auth { .. } => ErrorCode::ProviderAuthFailed,
            ProviderError::Quota { .. } => ErrorCode::ProviderQuotaExceeded,
            ProviderError::MissingCredential { .. } | ProviderError::Other { .. } => {
                ErrorCode::LlmError
            }
        };
        NexxonError::new(code, self.to_string())
    }
}

impl IntoNexxonError for BreakerError<ProviderError> {
    fn into_nexxon(self) -> NexxonError {
        match self {
            BreakerError::Inner(inner) => inner.into_nexxon(),
            BreakerError::Open { .. } => NexxonError::new(ErrorCode::CircuitOpen, self.to_string()),
            BreakerError::NotRegistered { .. } => {
                NexxonError::new(ErrorCode::ProviderUnavailable, self.to_string())
            }
        }
    }
}

impl IntoNexxonError for RegistryError {
    fn into_nexxon(self) -> NexxonError {
        NexxonError::new(ErrorCode::ProviderUnavailable, self.to_string())
    }
}

impl IntoNexxonError for LedgerError {
    fn into_nexxon(self) -> NexxonError {
        RuntimeError::from(self).into()
    }
}

impl IntoNexxonError for AuditError {
    fn into_nexxon(self) -> NexxonError {
        RuntimeError::from(self).into()
    }
}
