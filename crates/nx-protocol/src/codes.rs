// codes.rs - Canonical error codes, categories, and retry metadata.
//
// Codes are grouped into numeric bands by category:
//
// | Band      | Category |
// |-----------|----------|
// | 4000-4999 | policy   |
// | 5000-5999 | provider |
// | 6000-6999 | runtime  |
// | 7000-7999 | network  |
//
// Argument and command errors are `generic` but live in the runtime band.

use serde::{Deserialize, Serialize};

/// Broad class of a failure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Policy,
    Provider,
    Runtime,
    Network,
    Generic,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCategory::Policy => "policy",
            ErrorCategory::Provider => "provider",
            ErrorCategory::Runtime => "runtime",
            ErrorCategory::Network => "network",
            ErrorCategory::Generic => "generic",
        };
        write!(f, "{}", s)
    }
}

/// Advisory hint for the caller's retry loop. The runtime never acts on it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Fallback {
    LocalModel,
    NextProvider,
}

/// Retry metadata attached to every error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryInfo {
    pub retryable: bool,
    /// Seconds to wait before retrying.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Fallback>,
}

/// Every error code the control plane can emit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(into = "u16", try_from = "u16")]
pub enum ErrorCode {
    PolicyDenied,
    PolicyInvalidOverride,
    PolicyMergeConflict,
    PolicyLimitExceeded,

    ProviderUnavailable,
    ProviderTimeout,
    ProviderQuotaExceeded,
    ProviderAuthFailed,
    LlmError,
    CircuitOpen,

    RuntimeError,
    DiffApplyConflict,
    TestFailed,
    IndexCorrupt,
    InvalidArgs,
    UnknownCommand,

    NetworkUnreachable,
    DnsResolutionFailed,
    ConnectionRefused,
}

impl ErrorCode {
    /// All codes, in band order.
    pub const ALL: [ErrorCode; 19] = [
        ErrorCode::PolicyDenied,
        ErrorCode::PolicyInvalidOverride,
        ErrorCode::PolicyMergeConflict,
        ErrorCode::PolicyLimitExceeded,
        ErrorCode::ProviderUnavailable,
        ErrorCode::ProviderTimeout,
        ErrorCode::ProviderQuotaExceeded,
        ErrorCode::ProviderAuthFailed,
        ErrorCode::LlmError,
        ErrorCode::CircuitOpen,
        ErrorCode::RuntimeError,
        ErrorCode::DiffApplyConflict,
        ErrorCode::TestFailed,
        ErrorCode::IndexCorrupt,
        ErrorCode::InvalidArgs,
        ErrorCode::UnknownCommand,
        ErrorCode::NetworkUnreachable,
        ErrorCode::DnsResolutionFailed,
        ErrorCode::ConnectionRefused,
    ];

    pub fn as_u16(self) -> u16 {
        match self {
            ErrorCode::PolicyDenied => 4001,
            ErrorCode::PolicyInvalidOverride => 4002,
            ErrorCode::PolicyMergeConflict => 4003,
            ErrorCode::PolicyLimitExceeded => 4004,
            ErrorCode::ProviderUnavailable => 5001,
            ErrorCode::ProviderTimeout => 5002,
            ErrorCode::ProviderQuotaExceeded => 5003,
            ErrorCode::ProviderAuthFailed => 5004,
            ErrorCode::LlmError => 5005,
            ErrorCode::CircuitOpen => 5006,
            ErrorCode::RuntimeError => 6001,
            ErrorCode::DiffApplyConflict => 6002,
            ErrorCode::TestFailed => 6003,
            ErrorCode::IndexCorrupt => 6004,
            ErrorCode::InvalidArgs => 6100,
            ErrorCode::UnknownCommand => 6101,
            ErrorCode::NetworkUnreachable => 7001,
            ErrorCode::DnsResolutionFailed => 7002,
            ErrorCode::ConnectionRefused => 7003,
        }
    }

    pub fn from_u16(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_u16() == code)
    }

    /// Stable upper-case name, e.g. `POLICY_DENIED`.
    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::PolicyDenied => "POLICY_DENIED",
            ErrorCode::PolicyInvalidOverride => "POLICY_INVALID_OVERRIDE",
            ErrorCode::PolicyMergeConflict => "POLICY_MERGE_CONFLICT",
            ErrorCode::PolicyLimitExceeded => "POLICY_LIMIT_EXCEEDED",
            ErrorCode::ProviderUnavailable => "PROVIDER_UNAVAILABLE",
            ErrorCode::ProviderTimeout => "PROVIDER_TIMEOUT",
            ErrorCode::ProviderQuotaExceeded => "PROVIDER_QUOTA_EXCEEDED",
            ErrorCode::ProviderAuthFailed => "PROVIDER_AUTH_FAILED",
            ErrorCode::LlmError => "LLM_ERROR",
            ErrorCode::CircuitOpen => "CIRCUIT_OPEN",
            ErrorCode::RuntimeError => "RUNTIME_ERROR",
            ErrorCode::DiffApplyConflict => "DIFF_APPLY_CONFLICT",
            ErrorCode::TestFailed => "TEST_FAILED",
            ErrorCode::IndexCorrupt => "INDEX_CORRUPT",
            ErrorCode::InvalidArgs => "INVALID_ARGS",
            ErrorCode::UnknownCommand => "UNKNOWN_COMMAND",
            ErrorCode::NetworkUnreachable => "NETWORK_UNREACHABLE",
            ErrorCode::DnsResolutionFailed => "DNS_RESOLUTION_FAILED",
            ErrorCode::ConnectionRefused => "CONNECTION_REFUSED",
        }
    }

    pub fn category(self) -> ErrorCategory {
        match self {
            ErrorCode::InvalidArgs | ErrorCode::UnknownCommand => ErrorCategory::Generic,
            other => match other.as_u16() {
                4000..=4999 => ErrorCategory::Policy,
                5000..=5999 => ErrorCategory::Provider,
                6000..=6999 => ErrorCategory::Runtime,
                _ => ErrorCategory::Network,
            },
        }
    }

    /// Retry metadata. Retryability is an allow-list; everything else,
    /// including every policy code, is terminal.
    pub fn retry(self) -> RetryInfo {
        match self {
            ErrorCode::ProviderTimeout => RetryInfo {
                retryable: true,
                retry_after: Some(5),
                fallback: None,
            },
            ErrorCode::ProviderUnavailable => RetryInfo {
                retryable: true,
                retry_after: Some(10),
                fallback: Some(Fallback::NextProvider),
            },
            ErrorCode::NetworkUnreachable
            | ErrorCode::DnsResolutionFailed
            | ErrorCode::RuntimeError => RetryInfo {
                retryable: true,
                retry_after: Some(10),
                fallback: None,
            },
            _ => RetryInfo {
                retryable: false,
                retry_after: None,
                fallback: None,
            },
        }
    }

    pub fn docs_url(self) -> String {
        format!("https://docs.nexxon.dev/errors/{}", self.as_u16())
    }

    /// Actionable next steps shown to the user.
    pub fn suggestions(self) -> Vec<String> {
        let items: &[&str] = match self {
            ErrorCode::PolicyDenied => &[
                "Check policy.yaml configuration",
                "Verify file/command/host is in allow list",
                "Use --override-mode admin if you have appropriate role",
            ],
            ErrorCode::ProviderTimeout => &[
                "Check network connection",
                "Verify API endpoint is reachable",
                "Try again in a few seconds",
            ],
            ErrorCode::ProviderAuthFailed => &[
                "Check API key is set correctly",
                "Verify API key has not expired",
                "Ensure API key has required permissions",
            ],
            ErrorCode::ProviderUnavailable => &[
                "Try a different provider",
                "Enable local fallback in policy",
                "Check provider status page",
            ],
            ErrorCode::NetworkUnreachable => &[
                "Check internet connection",
                "Verify network policy allows outbound",
                "Try enabling local-only mode",
            ],
            ErrorCode::DiffApplyConflict => &[
                "Review conflicts manually",
                "Run undo to revert",
                "Apply changes incrementally",
            ],
            _ => &[
                "Check logs for details",
                "Retry the command",
                "Contact support if issue persists",
            ],
        };
        items.iter().map(|s| s.to_string()).collect()
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> u16 {
        code.as_u16()
    }
}

impl TryFrom<u16> for ErrorCode {
    type Error = String;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        ErrorCode::from_u16(code).ok_or_else(|| format!("unknown error code {}", code))
    }
}
