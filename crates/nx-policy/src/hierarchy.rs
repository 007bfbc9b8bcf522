// hierarchy.rs - Org/project/session policy merge and override validation.
//
// Merging is done section by section with a fixed rule per field:
//
// | Field                                          | Rule                         |
// |------------------------------------------------|------------------------------|
// | fs.allow, network.outbound, exec.allow         | intersection of non-empty    |
// | fs.deny, network.blocked, exec.confirm,        | deduplicated union           |
// |   approval.require_for, redaction.patterns     |                              |
// | limits.*                                       | minimum of specified values  |
// | version                                        | maximum                      |
// | models                                         | most specific layer wins     |
//
// A fragment that omits a field (or gives an empty allow list) does not
// take part in that field's merge. The result carries a canonical hash.

use serde::{Deserialize, Serialize};

use crate::document::{
    ApprovalFragment, ExecFragment, FsFragment, LimitsFragment, NetworkFragment, PolicyFragment,
    RedactionFragment, ScopeFragment,
};
use crate::hash::canonical_hash;
use crate::pattern::entry_key;

/// How strictly a session override is checked against the effective policy.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverrideMode {
    /// Overrides may only narrow the effective policy.
    #[default]
    Restrictive,
    /// Narrowing constraints are waived.
    Admin,
}

impl std::fmt::Display for OverrideMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverrideMode::Restrictive => write!(f, "restrictive"),
            OverrideMode::Admin => write!(f, "admin"),
        }
    }
}

/// Result of checking an override.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OverrideValidation {
    pub valid: bool,
    pub violations: Vec<String>,
}

/// A merged policy plus its content hash. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EffectivePolicy {
    #[serde(flatten)]
    pub policy: PolicyFragment,
    pub hash: String,
}

/// Tracks the most recently merged effective policy for override checks.
#[derive(Debug, Clone, Default)]
pub struct PolicyHierarchy {
    effective: Option<PolicyFragment>,
}

impl PolicyHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an already-known effective policy.
    pub fn with_effective(effective: PolicyFragment) -> Self {
        Self {
            effective: Some(effective),
        }
    }

    /// Merge the given layers and remember the result as the effective policy.
    pub fn merge(
        &mut self,
        org: Option<&PolicyFragment>,
        project: Option<&PolicyFragment>,
        session: Option<&PolicyFragment>,
    ) -> EffectivePolicy {
        let merged = merge_fragments(org, project, session);
        tracing::debug!(hash = %merged.hash, "policy hierarchy merged");
        self.effective = Some(merged.policy.clone());
        merged
    }

    pub fn set_effective(&mut self, effective: PolicyFragment) {
        self.effective = Some(effective);
    }

    pub fn effective(&self) -> Option<&PolicyFragment> {
        self.effective.as_ref()
    }

    /// Check an override against the effective policy.
    ///
    /// In restrictive mode limits may only go down and the allow lists
    /// (fs, network, exec) may only lose entries. With no effective policy
    /// recorded there is nothing to compare against and the override is valid.
    pub fn validate_override(
        &self,
        override_fragment: &PolicyFragment,
        mode: OverrideMode,
    ) -> OverrideValidation {
        let mut violations = Vec::new();

        if let (Some(effective), OverrideMode::Restrictive) = (&self.effective, mode) {
            if let Some(limits) = &override_fragment.limits {
                let current = effective.limits.unwrap_or_default();
                check_limit(
                    "tokens_per_session",
                    limits.tokens_per_session,
                    current.tokens_per_session,
                    &mut violations,
                );
                check_limit(
                    "files_read_per_minute",
                    limits.files_read_per_minute,
                    current.files_read_per_minute,
                    &mut violations,
                );
                check_limit(
                    "bytes_read_per_minute",
                    limits.bytes_read_per_minute,
                    current.bytes_read_per_minute,
                    &mut violations,
                );
            }

            check_no_additions(
                "network.outbound",
                "host",
                override_fragment.network().and_then(|n| n.outbound.as_ref()),
                effective.network().and_then(|n| n.outbound.as_ref()),
                &mut violations,
            );
            check_no_additions(
                "fs.allow",
                "path",
                override_fragment.fs().and_then(|f| f.allow.as_ref()),
                effective.fs().and_then(|f| f.allow.as_ref()),
                &mut violations,
            );
            check_no_additions(
                "exec.allow",
                "command",
                override_fragment.exec().and_then(|e| e.allow.as_ref()),
                effective.exec().and_then(|e| e.allow.as_ref()),
                &mut violations,
            );
        }

        if !violations.is_empty() {
            tracing::info!(mode = %mode, ?violations, "policy override rejected");
        }
        OverrideValidation {
            valid: violations.is_empty(),
            violations,
        }
    }
}

fn check_limit(field: &str, requested: Option<u64>, current: Option<u64>, out: &mut Vec<String>) {
    if let (Some(requested), Some(current)) = (requested, current) {
        if requested > current {
            out.push(format!(
                "{}: override value exceeds effective limit ({} > {})",
                field, requested, current
            ));
        }
    }
}

fn check_no_additions(
    field: &str,
    noun: &str,
    requested: Option<&Vec<String>>,
    current: Option<&Vec<String>>,
    out: &mut Vec<String>,
) {
    let Some(requested) = requested else {
        return;
    };
    let current: Vec<String> = current
        .into_iter()
        .flatten()
        .map(|e| entry_key(e))
        .collect();
    for entry in requested {
        if !current.contains(&entry_key(entry)) {
            out.push(format!(
                "{}: cannot add {} '{}' not present in effective policy",
                field, noun, entry
            ));
        }
    }
}

/// Merge up to three layers into an effective policy.
///
/// Pure; does not touch any hierarchy state.
pub fn merge_fragments(
    org: Option<&PolicyFragment>,
    project: Option<&PolicyFragment>,
    session: Option<&PolicyFragment>,
) -> EffectivePolicy {
    let layers: Vec<&PolicyFragment> = [org, project, session].into_iter().flatten().collect();

    let version = layers.iter().filter_map(|l| l.version).max();

    let fs = section(FsFragment {
        allow: intersect(layers.iter().map(|l| l.fs().and_then(|f| f.allow.as_ref()))),
        deny: union(layers.iter().map(|l| l.fs().and_then(|f| f.deny.as_ref()))),
    });
    let network = section(NetworkFragment {
        outbound: intersect(
            layers
                .iter()
                .map(|l| l.network().and_then(|n| n.outbound.as_ref())),
        ),
        blocked: union(
            layers
                .iter()
                .map(|l| l.network().and_then(|n| n.blocked.as_ref())),
        ),
    });
    let exec = section(ExecFragment {
        allow: intersect(layers.iter().map(|l| l.exec().and_then(|e| e.allow.as_ref()))),
        confirm: union(layers.iter().map(|l| l.exec().and_then(|e| e.confirm.as_ref()))),
    });
    let scope = section(ScopeFragment { fs, network, exec });

    let limits = section(LimitsFragment {
        tokens_per_session: min_of(layers.iter().map(|l| l.limits.and_then(|x| x.tokens_per_session))),
        files_read_per_minute: min_of(
            layers
                .iter()
                .map(|l| l.limits.and_then(|x| x.files_read_per_minute)),
        ),
        bytes_read_per_minute: min_of(
            layers
                .iter()
                .map(|l| l.limits.and_then(|x| x.bytes_read_per_minute)),
        ),
    });

    let approval = section(ApprovalFragment {
        require_for: union(
            layers
                .iter()
                .map(|l| l.approval.as_ref().and_then(|a| a.require_for.as_ref())),
        ),
    });

    let redaction = section(RedactionFragment {
        patterns: union(
            layers
                .iter()
                .map(|l| l.redaction.as_ref().and_then(|r| r.patterns.as_ref())),
        ),
    });

    let models = layers.iter().rev().find_map(|l| l.models.clone());

    let policy = PolicyFragment {
        version,
        scope,
        limits,
        approval,
        redaction,
        models,
    };
    let hash = canonical_hash(&policy);
    EffectivePolicy { policy, hash }
}

/// Keep a section only when at least one of its fields is present.
fn section<T: Default + PartialEq>(value: T) -> Option<T> {
    if value == T::default() {
        None
    } else {
        Some(value)
    }
}

fn intersect<'a>(lists: impl Iterator<Item = Option<&'a Vec<String>>>) -> Option<Vec<String>> {
    let mut participating = lists.flatten().filter(|l| !l.is_empty());
    let first = participating.next()?;
    let rest: Vec<&Vec<String>> = participating.collect();

    let rest: Vec<Vec<String>> = rest
        .iter()
        .map(|l| l.iter().map(|e| entry_key(e)).collect())
        .collect();

    // Entries keep the spelling of the first participating layer.
    let mut result: Vec<String> = Vec::new();
    let mut kept: Vec<String> = Vec::new();
    for entry in first {
        let key = entry_key(entry);
        if rest.iter().all(|l| l.contains(&key)) && !kept.contains(&key) {
            kept.push(key);
            result.push(entry.clone());
        }
    }
    Some(result)
}

fn union<'a, T: Clone + PartialEq + 'a>(
    lists: impl Iterator<Item = Option<&'a Vec<T>>>,
) -> Option<Vec<T>> {
    let mut seen_any = false;
    let mut result: Vec<T> = Vec::new();
    for list in lists.flatten() {
        seen_any = true;
        for entry in list {
            if !result.contains(entry) {
                result.push(entry.clone());
            }
        }
    }
    seen_any.then_some(result)
}

fn min_of(values: impl Iterator<Item = Option<u64>>) -> Option<u64> {
    values.flatten().min()
}
