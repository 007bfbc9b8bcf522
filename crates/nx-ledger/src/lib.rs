//! # nx-ledger
//!
//! The undo trail for Nexxon.
//!
//! - [`SessionLedger`]: sessions and append-only apply records in SQLite
//! - [`SnapshotStore`]: content-addressed prior state of applied files
//! - [`UndoManager`]: reverts the most recent apply records through
//!   `git restore` or snapshot restore

pub mod error;
pub mod ledger;
pub mod snapshot;
pub mod undo;

pub use error::LedgerError;
pub use ledger::{ApplyRecord, NewApply, SessionLedger, Session};
pub use snapshot::{SnapshotManifest, SnapshotStore};
pub use undo::{UndoManager, UndoMethod, UndoResult};
