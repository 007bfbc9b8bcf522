// error.rs - Error types for providers, breakers, and the registry.

use std::fmt;

use thiserror::Error;

/// A failed provider call, classified so the runtime can pick an error code.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider {provider} timed out")]
    Timeout { provider: String },

    #[error("provider {provider} unavailable: {reason}")]
    Unavailable { provider: String, reason: String },

    #[error("provider {provider} rejected credentials: {reason}")]
    Auth { provider: String, reason: String },

    #[error("provider {provider} quota exceeded: {reason}")]
    Quota { provider: String, reason: String },

    /// The credential source named in configuration is not set.
    #[error("provider {provider} needs credential from ${env}, which is not set")]
    MissingCredential { provider: String, env: String },

    #[error("provider {provider} error: {reason}")]
    Other { provider: String, reason: String },
}

impl ProviderError {
    /// Classify a transport-level failure.
    pub fn from_reqwest(provider: &str, err: reqwest::Error) -> Self {
        let provider = provider.to_string();
        if err.is_timeout() {
            ProviderError::Timeout { provider }
        } else if err.is_connect() {
            ProviderError::Unavailable {
                provider,
                reason: err.to_string(),
            }
        } else {
            ProviderError::Other {
                provider,
                reason: err.to_string(),
            }
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(provider: &str, status: u16, body: &str) -> Self {
        let provider = provider.to_string();
        let reason = format!("HTTP {}: {}", status, truncate(body, 300));
        match status {
            401 | 403 => ProviderError::Auth { provider, reason },
            429 => ProviderError::Quota { provider, reason },
            408 | 504 => ProviderError::Timeout { provider },
            500..=599 => ProviderError::Unavailable { provider, reason },
            _ => ProviderError::Other { provider, reason },
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Outcome of a breaker-wrapped call that did not produce a value.
///
/// `Inner` carries the operation's own error untouched.
#[derive(Debug)]
pub enum BreakerError<E> {
    /// The breaker is open; the operation was not invoked.
    Open { provider: String },
    /// No breaker is registered under this name; the operation was not invoked.
    NotRegistered { provider: String, available: String },
    /// The operation ran and failed.
    Inner(E),
}

impl<E> BreakerError<E> {
    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Inner(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }
}

impl<E: fmt::Display> fmt::Display for BreakerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerError::Open { provider } => {
                write!(f, "circuit breaker is open for provider: {}", provider)
            }
            BreakerError::NotRegistered {
                provider,
                available,
            } => write!(
                f,
                "circuit breaker not found for provider: {}. Available: {}",
                provider, available
            ),
            BreakerError::Inner(e) => e.fmt(f),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for BreakerError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BreakerError::Inner(e) => Some(e),
            _ => None,
        }
    }
}

/// Registry lookups and configuration failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("provider not found: {name}. Available: {available}")]
    NotFound { name: String, available: String },

    #[error("no providers registered; configure an LLM provider")]
    Empty,
}
