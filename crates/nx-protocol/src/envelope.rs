// envelope.rs - Request and response envelopes.
//
// Every inbound action is a RequestEnvelope and is always answered with a
// ResponseEnvelope, whether it succeeded, was denied, or failed.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use nx_policy::{OverrideMode, PolicyFragment};

use crate::codes::{ErrorCategory, RetryInfo};
use crate::error::{HelpInfo, NexxonError};

pub const API_VERSION: &str = "1.0";

/// The commands the runtime understands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Plan,
    Diff,
    Apply,
    Test,
    Search,
    Index,
    Log,
    Whoami,
    Undo,
    Validate,
    /// Anything else; answered with `UNKNOWN_COMMAND`.
    #[serde(other)]
    Unknown,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Plan => "plan",
            Command::Diff => "diff",
            Command::Apply => "apply",
            Command::Test => "test",
            Command::Search => "search",
            Command::Index => "index",
            Command::Log => "log",
            Command::Whoami => "whoami",
            Command::Undo => "undo",
            Command::Validate => "validate",
            Command::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Session-scoped policy override carried by a request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PolicyDirective {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<PolicyFragment>,
    #[serde(default)]
    pub override_mode: OverrideMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthContext {
    #[serde(rename = "type")]
    pub kind: String,
    pub token: String,
}

/// Caller identity claims.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub org: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Claims {
    /// Identity used when a request carries no claims.
    pub fn local() -> Self {
        Self {
            sub: "local".to_string(),
            org: "local".to_string(),
            roles: vec!["Developer".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<Claims>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionRef>,
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// An inbound action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestEnvelope {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "new_request_id")]
    pub id: String,
    pub command: Command,
    #[serde(default)]
    pub args: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<PolicyDirective>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<RequestContext>,
}

impl RequestEnvelope {
    /// A new request with a fresh id and no arguments.
    pub fn new(command: Command) -> Self {
        Self {
            api_version: default_api_version(),
            id: new_request_id(),
            command,
            args: Map::new(),
            policy: None,
            auth: None,
            context: None,
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    pub fn with_policy(mut self, policy: PolicyDirective) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_claims(mut self, claims: Claims) -> Self {
        self.context.get_or_insert_with(Default::default).claims = Some(claims);
        self
    }

    /// Parse an untyped JSON body. Malformed envelopes become `INVALID_ARGS`.
    pub fn from_value(value: Value) -> Result<Self, NexxonError> {
        serde_json::from_value(value)
            .map_err(|e| NexxonError::invalid_args(format!("malformed request envelope: {}", e)))
    }

    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }

    pub fn arg_bool(&self, key: &str) -> bool {
        self.args.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn arg_u64(&self, key: &str) -> Option<u64> {
        self.args.get(key).and_then(Value::as_u64)
    }

    /// A required string argument; missing or non-string is `INVALID_ARGS`.
    pub fn require_str(&self, key: &str) -> Result<&str, NexxonError> {
        self.arg_str(key).ok_or_else(|| {
            NexxonError::invalid_args(format!("missing required argument '{}'", key))
                .with_context(self.command.as_str(), self.args.clone())
                .with_details(json!({ "missing": [key] }))
        })
    }

    /// Claims from the request context, or the local default identity.
    pub fn claims(&self) -> Claims {
        self.context
            .as_ref()
            .and_then(|c| c.claims.clone())
            .unwrap_or_else(Claims::local)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Ok,
    Error,
    InProgress,
}

/// The error section of a response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    /// Numeric code rendered as a string.
    pub code: String,
    pub message: String,
    pub category: ErrorCategory,
    pub retry: RetryInfo,
    pub help: HelpInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorBody {
    pub fn code_number(&self) -> Option<u16> {
        self.code.parse().ok()
    }
}

impl From<&NexxonError> for ErrorBody {
    fn from(err: &NexxonError) -> Self {
        Self {
            code: err.code.to_string(),
            message: err.message.clone(),
            category: err.category,
            retry: err.retry.clone(),
            help: err.help.clone(),
            details: err.details.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Metrics {
    pub latency_ms: u64,
}

/// The answer to every request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseEnvelope {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    pub id: String,
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Metrics>,
}

impl ResponseEnvelope {
    pub fn ok(id: impl Into<String>, result: Value) -> Self {
        Self {
            api_version: default_api_version(),
            id: id.into(),
            status: ResponseStatus::Ok,
            result: Some(result),
            error: None,
            metrics: None,
        }
    }

    pub fn error(id: impl Into<String>, err: &NexxonError) -> Self {
        Self {
            api_version: default_api_version(),
            id: id.into(),
            status: ResponseStatus::Error,
            result: None,
            error: Some(ErrorBody::from(err)),
            metrics: None,
        }
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.metrics = Some(Metrics { latency_ms });
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }
}
