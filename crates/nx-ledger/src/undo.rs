// undo.rs - UndoManager: reverts apply records via git or snapshots.
//
// Inside a git work tree each changed file is restored with `git restore`;
// elsewhere the record's snapshot manifest supplies the prior content.
// Records are reverted one at a time and files one at a time, so every
// conflict is attributed to exactly one file. A batch runs oldest record
// first; once a file has been restored, newer records in the same batch
// leave it alone, since the oldest backup already holds the target state.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::ledger::ApplyRecord;
use crate::snapshot::SnapshotStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndoMethod {
    Git,
    Snapshot,
}

impl fmt::Display for UndoMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UndoMethod::Git => write!(f, "git"),
            UndoMethod::Snapshot => write!(f, "snapshot"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoResult {
    /// True when every record was reverted with no conflicts.
    pub reverted: bool,
    /// Records fully reverted.
    pub steps: usize,
    pub method: UndoMethod,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<String>,
}

pub struct UndoManager {
    project_root: PathBuf,
    snapshots: SnapshotStore,
}

impl UndoManager {
    pub fn new(project_root: impl Into<PathBuf>, snapshots: SnapshotStore) -> Self {
        Self {
            project_root: project_root.into(),
            snapshots,
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    fn git_cmd(&self, args: &[&str]) -> Result<String, LedgerError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.project_root)
            .output()
            .map_err(|e| LedgerError::Git(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LedgerError::Git(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    pub fn is_git_repo(&self) -> bool {
        self.git_cmd(&["rev-parse", "--git-dir"]).is_ok()
    }

    /// Current `HEAD`, when the project is a git work tree with commits.
    pub fn head_revision(&self) -> Option<String> {
        self.git_cmd(&["rev-parse", "HEAD"]).ok()
    }

    pub fn method(&self) -> UndoMethod {
        if self.is_git_repo() {
            UndoMethod::Git
        } else {
            UndoMethod::Snapshot
        }
    }

    /// Revert `records`, supplied newest first (as
    /// `SessionLedger::last_apply_records` returns them), working from the
    /// oldest of the batch forward.
    pub fn undo(&self, records: &[ApplyRecord]) -> UndoResult {
        self.undo_with(records, self.method())
    }

    pub fn undo_with(&self, records: &[ApplyRecord], method: UndoMethod) -> UndoResult {
        let mut steps = 0;
        let mut conflicts = Vec::new();
        let mut restored = HashSet::new();

        for record in records.iter().rev() {
            let record_conflicts = match method {
                UndoMethod::Git => self.revert_with_git(record, &mut restored),
                UndoMethod::Snapshot => self.revert_with_snapshot(record, &mut restored),
            };
            if record_conflicts.is_empty() {
                steps += 1;
            } else {
                tracing::warn!(
                    record = %record.id,
                    conflicts = record_conflicts.len(),
                    "record not fully reverted"
                );
                conflicts.extend(record_conflicts);
            }
        }

        let reverted = steps == records.len() && conflicts.is_empty();
        tracing::info!(%method, steps, requested = records.len(), reverted, "undo finished");
        UndoResult {
            reverted,
            steps,
            method,
            conflicts,
        }
    }

    fn revert_with_git(&self, record: &ApplyRecord, restored: &mut HashSet<String>) -> Vec<String> {
        let mut conflicts = Vec::new();
        for file in &record.files_changed {
            if restored.contains(file) {
                continue;
            }
            let result = match &record.source_revision {
                Some(rev) => self.git_cmd(&["restore", "--source", rev, "--", file]),
                None => self.git_cmd(&["restore", "--", file]),
            };
            match result {
                Ok(_) => {
                    restored.insert(file.clone());
                }
                Err(e) => conflicts.push(format!("{file}: {e}")),
            }
        }
        conflicts
    }

    fn revert_with_snapshot(
        &self,
        record: &ApplyRecord,
        restored: &mut HashSet<String>,
    ) -> Vec<String> {
        let manifest = match record
            .backup_path
            .as_deref()
            .map(|p| self.snapshots.load_manifest(p))
        {
            Some(Ok(manifest)) => manifest,
            Some(Err(LedgerError::SnapshotNotFound(_))) | None => {
                return vec![format!("{}: backup not found", record.id)];
            }
            Some(Err(e)) => return vec![format!("{}: {e}", record.id)],
        };

        let mut conflicts = Vec::new();
        for file in &record.files_changed {
            if restored.contains(file) {
                continue;
            }
            let full = self.project_root.join(file);
            let outcome = match manifest.files.get(file) {
                None => Err(format!("{file}: not in backup")),
                Some(None) => remove_if_present(&full).map_err(|e| format!("{file}: {e}")),
                Some(Some(hash)) => self
                    .restore_blob(hash, &full)
                    .map_err(|e| format!("{file}: {e}")),
            };
            match outcome {
                Ok(()) => {
                    restored.insert(file.clone());
                }
                Err(conflict) => conflicts.push(conflict),
            }
        }
        conflicts
    }

    fn restore_blob(&self, hash: &str, dest: &Path) -> Result<(), LedgerError> {
        let content = self.snapshots.read_blob(hash)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| LedgerError::io(parent, e))?;
        }
        fs::write(dest, content).map_err(|e| LedgerError::io(dest, e))
    }
}

/// A file created by the apply is removed on undo.
fn remove_if_present(path: &Path) -> Result<(), LedgerError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(LedgerError::io(path, e)),
    }
}
