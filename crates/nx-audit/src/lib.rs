//! # nx-audit
//!
//! Append-only audit trail for Nexxon.
//!
//! Every inbound request is recorded as an [`AuditEntry`] in a JSONL file
//! (`.nexxon/audit.log`). Before an entry is written, the configured
//! [`Redactor`] scrubs secrets from every string field. Entries are linked
//! by `previous_hash`, so [`AuditLog::verify_chain`] detects edits.
//!
//! ```rust,no_run
//! use nx_audit::{Actor, AuditEntry, AuditLog};
//!
//! let mut log = AuditLog::open(".nexxon/audit.log").unwrap();
//! log.append(&AuditEntry::new(Actor::User, "whoami")).unwrap();
//! ```

pub mod entry;
pub mod error;
pub mod hasher;
pub mod log;
pub mod redact;

pub use entry::{Actor, AuditEntry, Decision, PolicyRecord, ResultRecord, ResultStatus, Target};
pub use error::AuditError;
pub use log::AuditLog;
pub use redact::{Redactor, REDACTED_MARKER};
