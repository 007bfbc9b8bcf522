//! # nx-policy
//!
//! Policy model and enforcement for Nexxon.
//!
//! A [`PolicyDocument`] is loaded once at startup (from `policy.yaml`) and
//! never mutated. The [`PolicyEnforcer`] evaluates file, network, exec, and
//! rate-limit checks against that document and owns the per-session
//! counters. The [`PolicyHierarchy`] merges org/project/session
//! [`PolicyFragment`]s into an [`EffectivePolicy`] and validates session
//! overrides against it.
//!
//! ## Key invariants
//!
//! - **Deny wins**: a deny/blocked match beats any allow match for the same subject.
//! - **Default deny**: a subject that matches no allow rule is denied.
//! - **Most restrictive merge**: allow lists intersect, deny lists union, limits take the minimum.
//! - **Stable identity**: policy hashes are computed over a sorted-key canonical form.

pub mod document;
pub mod enforcer;
pub mod error;
pub mod hash;
pub mod hierarchy;
pub mod pattern;

pub use document::{
    Approval, ApprovalFragment, ExecFragment, ExecScope, FsFragment, FsScope, Limits,
    LimitsFragment, ModelProvider, Models, NetworkFragment, NetworkScope, PolicyDocument,
    PolicyFragment, Redaction, RedactionAction, RedactionFragment, RedactionPattern, Scope,
    ScopeFragment,
};
pub use enforcer::{confine, DecisionRow, ExecVerdict, PolicyEnforcer, Verdict, RATE_WINDOW};
pub use error::PolicyError;
pub use hash::canonical_hash;
pub use hierarchy::{
    merge_fragments, EffectivePolicy, OverrideMode, OverrideValidation, PolicyHierarchy,
};
pub use pattern::{PatternMatcher, SubjectKind};
