// enforcer.rs - Per-session policy enforcement.
//
// The PolicyEnforcer is the single chokepoint for side effects. Every
// file access, outbound host, command, token spend, and file read flows
// through one of its check methods before the runtime acts.
//
// Path and host evaluation order:
//
// 1. Path traversal ("..") → Deny
// 2. Any deny/blocked match → Deny, citing the rule
// 3. First allow/outbound match → Allow, citing the rule
// 4. No match → Deny ("not in allow list")
//
// The counters (token budget, per-minute read window) live behind one
// mutex so a check and its increment are a single atomic step even when
// several requests are served concurrently.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::document::PolicyDocument;
use crate::error::PolicyError;
use crate::hierarchy::merge_fragments;
use crate::pattern::{PatternMatcher, SubjectKind};

/// Length of the file/byte read rate window.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Outcome of a single policy check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Verdict {
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// The policy rule that decided the outcome, when one did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
}

impl Verdict {
    fn allow(rule: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: None,
            rule: Some(rule.into()),
        }
    }

    fn deny(reason: impl Into<String>, rule: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            rule: Some(rule.into()),
        }
    }
}

/// Outcome of an exec check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecVerdict {
    pub allowed: bool,
    pub requires_confirm: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// One row of a `policy_trace` (action, subject, decision, rule).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecisionRow {
    pub action: String,
    pub subject: String,
    pub decision: String,
    pub rule: String,
}

/// Mutable per-session counters. Owned by exactly one enforcer.
#[derive(Debug)]
struct EnforcementState {
    session_tokens_used: u64,
    files_read_in_window: u64,
    bytes_read_in_window: u64,
    window_start: Instant,
}

/// Evaluates fs/network/exec/rate-limit rules against one policy document.
pub struct PolicyEnforcer {
    document: PolicyDocument,
    fs_allow: PatternMatcher,
    fs_deny: PatternMatcher,
    net_allow: PatternMatcher,
    net_block: PatternMatcher,
    state: Mutex<EnforcementState>,
}

impl PolicyEnforcer {
    /// Build an enforcer for a document, compiling its patterns once.
    pub fn new(document: PolicyDocument) -> Result<Self, PolicyError> {
        let scope = &document.scope;
        let fs_allow = PatternMatcher::new(SubjectKind::Path, &scope.fs.allow)?;
        let fs_deny = PatternMatcher::new(SubjectKind::Path, &scope.fs.deny)?;
        let net_allow = PatternMatcher::new(SubjectKind::Host, &scope.network.outbound)?;
        let net_block = PatternMatcher::new(SubjectKind::Host, &scope.network.blocked)?;

        for pattern in &document.redaction.patterns {
            regex::Regex::new(&pattern.regex).map_err(|e| PolicyError::InvalidRedaction {
                name: pattern.name.clone(),
                reason: e.to_string(),
            })?;
        }

        Ok(Self {
            document,
            fs_allow,
            fs_deny,
            net_allow,
            net_block,
            state: Mutex::new(EnforcementState {
                session_tokens_used: 0,
                files_read_in_window: 0,
                bytes_read_in_window: 0,
                window_start: Instant::now(),
            }),
        })
    }

    /// Load a YAML policy document from disk and build an enforcer for it.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, PolicyError> {
        Self::new(PolicyDocument::load(path)?)
    }

    /// The document this enforcer evaluates against.
    pub fn document(&self) -> &PolicyDocument {
        &self.document
    }

    /// Check whether a project-relative path may be accessed.
    pub fn check_fs_access(&self, path: &str) -> Verdict {
        let verdict = if let Some(denied) = confine(path) {
            denied
        } else if let Some(rule) = self.fs_deny.first_match(path) {
            Verdict::deny(format!("Path denied by policy: {}", rule), "fs.deny")
        } else if let Some(rule) = self.fs_allow.first_match(path) {
            Verdict::allow(format!("fs.allow:{}", rule))
        } else {
            Verdict::deny("Path not in allow list", "fs.allow")
        };
        log_verdict("fs", path, &verdict);
        verdict
    }

    /// Check whether an outbound connection to `host` is allowed.
    pub fn check_network(&self, host: &str) -> Verdict {
        let verdict = if let Some(rule) = self.net_block.first_match(host) {
            Verdict::deny(format!("Host blocked by policy: {}", rule), "network.blocked")
        } else if let Some(rule) = self.net_allow.first_match(host) {
            Verdict::allow(format!("network.outbound:{}", rule))
        } else {
            Verdict::deny("Host not in outbound allow list", "network.outbound")
        };
        log_verdict("network", host, &verdict);
        verdict
    }

    /// Check a shell command. The program (first whitespace token) must be
    /// allowed; any confirm substring anywhere in the command requires confirmation.
    pub fn check_exec(&self, command: &str) -> ExecVerdict {
        let program = command.split_whitespace().next().unwrap_or("");
        let exec = &self.document.scope.exec;

        if !exec.allow.iter().any(|allowed| allowed == program) {
            tracing::info!(command, program, "exec denied");
            return ExecVerdict {
                allowed: false,
                requires_confirm: false,
                reason: Some(format!("Command not allowed: {}", program)),
            };
        }

        let requires_confirm = exec
            .confirm
            .iter()
            .any(|needle| !needle.is_empty() && command.contains(needle.as_str()));
        tracing::debug!(command, requires_confirm, "exec allowed");
        ExecVerdict {
            allowed: true,
            requires_confirm,
            reason: None,
        }
    }

    /// Reserve `tokens` from the session budget.
    ///
    /// A denied check leaves the budget untouched; only an allowed check
    /// commits its tokens.
    pub fn check_token_limit(&self, tokens: u64) -> Verdict {
        let budget = self.document.limits.tokens_per_session;
        let mut state = self.lock_state();
        let proposed = state.session_tokens_used.saturating_add(tokens);
        if proposed > budget {
            let verdict = Verdict::deny(
                format!("Token limit exceeded: {}/{}", proposed, budget),
                "limits.tokens_per_session",
            );
            log_verdict("tokens", &tokens.to_string(), &verdict);
            return verdict;
        }
        state.session_tokens_used = proposed;
        Verdict::allow("limits.tokens_per_session")
    }

    /// Count one file read of `bytes` against the per-minute limits.
    pub fn check_file_read_limit(&self, bytes: u64) -> Verdict {
        self.check_file_read_limit_at(bytes, Instant::now())
    }

    /// Same as [`check_file_read_limit`](Self::check_file_read_limit) with an explicit clock reading.
    pub fn check_file_read_limit_at(&self, bytes: u64, now: Instant) -> Verdict {
        let limits = self.document.limits;
        let mut state = self.lock_state();

        if now.saturating_duration_since(state.window_start) >= RATE_WINDOW {
            state.files_read_in_window = 0;
            state.bytes_read_in_window = 0;
            state.window_start = now;
        }

        // Counters always advance, even when this read is refused.
        state.files_read_in_window += 1;
        state.bytes_read_in_window = state.bytes_read_in_window.saturating_add(bytes);

        let verdict = if state.files_read_in_window > limits.files_read_per_minute {
            Verdict::deny(
                format!(
                    "File read rate limit exceeded: {}/{} files per minute",
                    state.files_read_in_window, limits.files_read_per_minute
                ),
                "limits.files_read_per_minute",
            )
        } else if state.bytes_read_in_window > limits.bytes_read_per_minute {
            Verdict::deny(
                format!(
                    "Bytes read rate limit exceeded: {}/{} bytes per minute",
                    state.bytes_read_in_window, limits.bytes_read_per_minute
                ),
                "limits.bytes_read_per_minute",
            )
        } else {
            return Verdict::allow("limits.read_rate");
        };
        log_verdict("read", &bytes.to_string(), &verdict);
        verdict
    }

    /// Tokens committed so far this session.
    pub fn tokens_used(&self) -> u64 {
        self.lock_state().session_tokens_used
    }

    /// Content hash of the document, recomputed on every call.
    ///
    /// Computed through the same merge and canonical hash as
    /// [`PolicyHierarchy`](crate::PolicyHierarchy), so a `validate` with no
    /// overrides reports the same identity.
    pub fn effective_hash(&self) -> String {
        merge_fragments(None, Some(&self.document.to_fragment()), None).hash
    }

    /// Evaluate a fixed sample set and report each decision.
    pub fn decision_trace(&self, samples: &[(&str, &str)]) -> Vec<DecisionRow> {
        samples
            .iter()
            .map(|(action, subject)| match *action {
                "exec" => {
                    let v = self.check_exec(subject);
                    let (decision, rule) = if !v.allowed {
                        ("deny", "exec.allow")
                    } else if v.requires_confirm {
                        ("confirm", "exec.confirm")
                    } else {
                        ("allow", "exec.allow")
                    };
                    DecisionRow {
                        action: action.to_string(),
                        subject: subject.to_string(),
                        decision: decision.to_string(),
                        rule: rule.to_string(),
                    }
                }
                _ => {
                    let v = if *action == "network" {
                        self.check_network(subject)
                    } else {
                        self.check_fs_access(subject)
                    };
                    DecisionRow {
                        action: action.to_string(),
                        subject: subject.to_string(),
                        decision: if v.allowed { "allow" } else { "deny" }.to_string(),
                        rule: v.rule.unwrap_or_default(),
                    }
                }
            })
            .collect()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, EnforcementState> {
        // A poisoned lock only means another thread panicked mid-check;
        // the counters themselves are plain integers and stay usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn log_verdict(kind: &str, subject: &str, verdict: &Verdict) {
    if verdict.allowed {
        tracing::debug!(kind, subject, rule = ?verdict.rule, "policy allow");
    } else {
        tracing::info!(kind, subject, reason = ?verdict.reason, "policy deny");
    }
}

/// Deny subjects that cannot name a file inside the project: `..`
/// components and absolute paths. Applies whatever the allow list says, and
/// also when no policy is loaded.
pub fn confine(path: &str) -> Option<Verdict> {
    if contains_path_traversal(path) {
        Some(Verdict::deny(
            format!("Path traversal detected: '{}'", path),
            "fs.traversal",
        ))
    } else if is_outside_project(path) {
        Some(Verdict::deny(
            format!("Path is outside the project: '{}'", path),
            "fs.outside_project",
        ))
    } else {
        None
    }
}

/// Absolute (`/x`, `C:/x`, `//server/x`) or home-relative (`~/x`) paths.
fn is_outside_project(path: &str) -> bool {
    let normalized = path.replace('\\', "/");
    let bytes = normalized.as_bytes();
    normalized.starts_with('/')
        || normalized.starts_with('~')
        || (bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':')
}

/// Detect ".." path components, including percent-encoded forms.
fn contains_path_traversal(path: &str) -> bool {
    let normalized = path.replace('\\', "/");
    normalized.split('/').any(|part| part == "..")
        || normalized.contains("%2e%2e")
        || normalized.contains("%2E%2E")
}
