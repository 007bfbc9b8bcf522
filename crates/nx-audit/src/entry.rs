// entry.rs - One line of the audit log.
//
// An AuditEntry records who did what, to which target, what the policy
// said, and how it ended. Entries are immutable once appended; the log
// links each one to its predecessor through `previous_hash`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who initiated the action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    User,
    Agent,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Target {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny,
    Confirm,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyRecord {
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultRecord {
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// A single audit record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditEntry {
    pub ts: DateTime<Utc>,
    pub actor: Actor,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<PolicyRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultRecord>,
    /// SHA-256 of the previous line. `None` for the first entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<String>,
}

impl AuditEntry {
    pub fn new(actor: Actor, action: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            actor,
            action: action.into(),
            target: None,
            policy: None,
            result: None,
            previous_hash: None,
        }
    }

    pub fn with_target(mut self, path: Option<String>, op: Option<String>) -> Self {
        if path.is_some() || op.is_some() {
            self.target = Some(Target { path, op });
        }
        self
    }

    pub fn with_policy(mut self, decision: Decision, rule: Option<String>) -> Self {
        self.policy = Some(PolicyRecord { decision, rule });
        self
    }

    pub fn with_result(mut self, status: ResultStatus, details: Option<String>) -> Self {
        self.result = Some(ResultRecord { status, details });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_sections_are_omitted() {
        let entry = AuditEntry::new(Actor::User, "whoami");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["actor"], "user");
        assert!(json.get("target").is_none());
        assert!(json.get("previous_hash").is_none());
    }

    #[test]
    fn builder_fills_sections() {
        let entry = AuditEntry::new(Actor::Agent, "apply")
            .with_target(Some("src/a.rs".into()), Some("write".into()))
            .with_policy(Decision::Deny, Some("fs.deny".into()))
            .with_result(ResultStatus::Error, None);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["target"]["path"], "src/a.rs");
        assert_eq!(json["policy"]["decision"], "deny");
        assert_eq!(json["result"]["status"], "error");
    }

    #[test]
    fn empty_target_is_dropped() {
        let entry = AuditEntry::new(Actor::User, "log").with_target(None, None);
        assert!(entry.target.is_none());
    }
}
