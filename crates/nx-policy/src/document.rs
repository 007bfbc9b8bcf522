// document.rs - Policy document and fragment definitions.
//
// A PolicyDocument is the fully specified policy the enforcer runs against.
// A PolicyFragment has the same shape with every field optional; org,
// project, and session layers are fragments, and so are overrides. The
// hierarchy merges fragments section by section (see hierarchy.rs).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// Filesystem rules. Patterns are project-relative paths or globs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FsScope {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

/// Outbound network rules. Patterns are host names or host globs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkScope {
    #[serde(default)]
    pub outbound: Vec<String>,
    #[serde(default)]
    pub blocked: Vec<String>,
}

/// Command execution rules.
///
/// `allow` lists program names (the first whitespace token of a command).
/// `confirm` lists substrings that make an allowed command require
/// explicit confirmation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecScope {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub confirm: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Scope {
    #[serde(default)]
    pub fs: FsScope,
    #[serde(default)]
    pub network: NetworkScope,
    #[serde(default)]
    pub exec: ExecScope,
}

/// Budget limits. Token budget is per session; read limits are per minute.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Limits {
    pub tokens_per_session: u64,
    pub files_read_per_minute: u64,
    pub bytes_read_per_minute: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Approval {
    #[serde(default)]
    pub require_for: Vec<String>,
}

/// What to do with a redaction match.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RedactionAction {
    /// Replace the match with `sha256:<hex>` of the matched text.
    Hash,
    /// Replace the match with a fixed marker.
    Redact,
    /// Remove the match entirely.
    Drop,
}

/// A regex + action rule applied to audit entries before they are persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RedactionPattern {
    #[serde(default)]
    pub name: String,
    pub regex: String,
    pub action: RedactionAction,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Redaction {
    #[serde(default)]
    pub patterns: Vec<RedactionPattern>,
}

/// A model provider entry in the policy's `models` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelProvider {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
}

/// Which model providers the policy admits and whether local fallback is allowed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Models {
    #[serde(default)]
    pub providers: Vec<ModelProvider>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_fallback: Option<bool>,
}

/// A complete, immutable policy document.
///
/// Loaded once at startup. Overrides never mutate a document; they are
/// merged as fragments into a new effective policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyDocument {
    pub version: u32,
    #[serde(default)]
    pub scope: Scope,
    pub limits: Limits,
    #[serde(default)]
    pub approval: Approval,
    #[serde(default)]
    pub redaction: Redaction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<Models>,
}

impl PolicyDocument {
    /// Load a policy document from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| PolicyError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| PolicyError::ParseFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Lift this document into a fragment with every field present.
    pub fn to_fragment(&self) -> PolicyFragment {
        PolicyFragment {
            version: Some(self.version),
            scope: Some(ScopeFragment {
                fs: Some(FsFragment {
                    allow: Some(self.scope.fs.allow.clone()),
                    deny: Some(self.scope.fs.deny.clone()),
                }),
                network: Some(NetworkFragment {
                    outbound: Some(self.scope.network.outbound.clone()),
                    blocked: Some(self.scope.network.blocked.clone()),
                }),
                exec: Some(ExecFragment {
                    allow: Some(self.scope.exec.allow.clone()),
                    confirm: Some(self.scope.exec.confirm.clone()),
                }),
            }),
            limits: Some(LimitsFragment {
                tokens_per_session: Some(self.limits.tokens_per_session),
                files_read_per_minute: Some(self.limits.files_read_per_minute),
                bytes_read_per_minute: Some(self.limits.bytes_read_per_minute),
            }),
            approval: Some(ApprovalFragment {
                require_for: Some(self.approval.require_for.clone()),
            }),
            redaction: Some(RedactionFragment {
                patterns: Some(self.redaction.patterns.clone()),
            }),
            models: self.models.clone(),
        }
    }
}

// ── Fragments ────────────────────────────────────────────────────
//
// `skip_serializing_if` keeps absent fields out of the canonical form, so
// "field omitted" and "field present but empty" hash differently.

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FsFragment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deny: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkFragment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbound: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecFragment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirm: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScopeFragment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs: Option<FsFragment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkFragment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<ExecFragment>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LimitsFragment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_per_session: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_read_per_minute: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes_read_per_minute: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApprovalFragment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_for: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RedactionFragment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patterns: Option<Vec<RedactionPattern>>,
}

/// One layer of policy (org, project, session, or an override).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyFragment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ScopeFragment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<LimitsFragment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval: Option<ApprovalFragment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redaction: Option<RedactionFragment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<Models>,
}

impl PolicyFragment {
    pub fn fs(&self) -> Option<&FsFragment> {
        self.scope.as_ref().and_then(|s| s.fs.as_ref())
    }

    pub fn network(&self) -> Option<&NetworkFragment> {
        self.scope.as_ref().and_then(|s| s.network.as_ref())
    }

    pub fn exec(&self) -> Option<&ExecFragment> {
        self.scope.as_ref().and_then(|s| s.exec.as_ref())
    }
}
