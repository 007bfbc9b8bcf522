// error.rs - The wire-level error type.
//
// A NexxonError is built at the error site, carries everything a client
// needs to react (category, retry hints, docs), and is converted into a
// response envelope at the dispatch boundary. It is never persisted.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::codes::{ErrorCategory, ErrorCode, RetryInfo};

/// Which request produced the error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorContext {
    pub command: String,
    pub args: Map<String, Value>,
    /// ISO-8601.
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HelpInfo {
    pub docs: String,
    pub suggestions: Vec<String>,
}

/// A categorized, client-facing error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Error)]
#[error("[{code}] {message}")]
pub struct NexxonError {
    pub code: ErrorCode,
    pub category: ErrorCategory,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub retry: RetryInfo,
    pub context: ErrorContext,
    pub help: HelpInfo,
}

impl NexxonError {
    /// Build an error; category, retry, and help are derived from the code.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            category: code.category(),
            message: message.into(),
            details: None,
            retry: code.retry(),
            context: ErrorContext {
                command: "unknown".to_string(),
                args: Map::new(),
                timestamp: Utc::now().to_rfc3339(),
            },
            help: HelpInfo {
                docs: code.docs_url(),
                suggestions: code.suggestions(),
            },
        }
    }

    pub fn with_context(mut self, command: impl Into<String>, args: Map<String, Value>) -> Self {
        self.context.command = command.into();
        self.context.args = args;
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn policy_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PolicyDenied, message)
    }

    pub fn invalid_args(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgs, message)
    }

    /// Generic runtime failure; also the wrapper for anything untyped.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RuntimeError, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.retry.retryable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn metadata_follows_code() {
        let err = NexxonError::new(ErrorCode::ProviderTimeout, "slow");
        assert_eq!(err.category, ErrorCategory::Provider);
        assert!(err.is_retryable());
        assert_eq!(err.retry.retry_after, Some(5));
        assert_eq!(err.help.docs, "https://docs.nexxon.dev/errors/5002");
        assert_eq!(err.to_string(), "[5002] slow");
    }

    #[test]
    fn policy_denied_is_terminal() {
        let err = NexxonError::policy_denied("Path denied by policy: ./secrets");
        assert_eq!(err.category, ErrorCategory::Policy);
        assert!(!err.is_retryable());
        assert!(err.retry.retry_after.is_none());
    }

    #[test]
    fn context_and_details_attach() {
        let mut args = Map::new();
        args.insert("file".into(), json!("src/a.rs"));
        let err = NexxonError::invalid_args("missing content")
            .with_context("apply", args)
            .with_details(json!({"missing": ["content"]}));
        assert_eq!(err.context.command, "apply");
        assert_eq!(err.context.args["file"], "src/a.rs");
        assert_eq!(err.details.unwrap()["missing"][0], "content");
    }

    #[test]
    fn serializes_code_as_number() {
        let json = serde_json::to_value(NexxonError::runtime("boom")).unwrap();
        assert_eq!(json["code"], 6001);
        assert_eq!(json["category"], "runtime");
        assert_eq!(json["retry"]["retryable"], true);
        assert!(json.get("details").is_none());
    }
}
