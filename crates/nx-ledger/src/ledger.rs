// ledger.rs - SessionLedger: sessions and apply-records in SQLite.
//
// The ledger is append-only. An apply record is written once per committed
// write and never updated; the only deletion is retention cleanup of
// sessions that have already ended.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    user_id TEXT
);
CREATE TABLE IF NOT EXISTS apply_records (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    ts TEXT NOT NULL,
    patch_path TEXT,
    git_sha TEXT,
    files_changed TEXT NOT NULL,
    backup_path TEXT,
    FOREIGN KEY (session_id) REFERENCES sessions(id)
);
CREATE INDEX IF NOT EXISTS idx_session_ts ON apply_records(session_id, ts DESC);
";

const RECORD_COLUMNS: &str =
    "id, session_id, ts, patch_path, git_sha, files_changed, backup_path";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// One committed write, the unit of undo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyRecord {
    pub id: String,
    pub session_id: String,
    pub ts: DateTime<Utc>,
    pub files_changed: Vec<String>,
    /// Snapshot manifest holding the prior content of `files_changed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_path: Option<String>,
    /// Source-control revision the files were at before the write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_revision: Option<String>,
}

/// Fields supplied by the caller of [`SessionLedger::record_apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewApply {
    pub files_changed: Vec<String>,
    pub backup_path: Option<String>,
    pub patch_path: Option<String>,
    pub source_revision: Option<String>,
}

impl NewApply {
    pub fn new(files_changed: Vec<String>) -> Self {
        Self {
            files_changed,
            ..Self::default()
        }
    }

    pub fn with_backup(mut self, backup_path: impl Into<String>) -> Self {
        self.backup_path = Some(backup_path.into());
        self
    }

    pub fn with_source_revision(mut self, revision: impl Into<String>) -> Self {
        self.source_revision = Some(revision.into());
        self
    }
}

struct Inner {
    conn: Connection,
    current: Option<String>,
}

pub struct SessionLedger {
    inner: Mutex<Inner>,
}

impl SessionLedger {
    /// Open (or create) the ledger database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LedgerError::io(parent, e))?;
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, LedgerError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, LedgerError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            inner: Mutex::new(Inner {
                conn,
                current: None,
            }),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a session and make it current.
    pub fn start_session(&self, user_id: Option<&str>) -> Result<Session, LedgerError> {
        let mut inner = self.lock();
        let session = insert_session(&inner.conn, user_id)?;
        inner.current = Some(session.id.clone());
        Ok(session)
    }

    /// Mark a session ended. Clears the current session if it matches.
    pub fn end_session(&self, id: &str) -> Result<(), LedgerError> {
        let mut inner = self.lock();
        let updated = inner.conn.execute(
            "UPDATE sessions SET ended_at = ?1 WHERE id = ?2",
            params![format_ts(Utc::now()), id],
        )?;
        if updated == 0 {
            return Err(LedgerError::SessionNotFound(id.to_string()));
        }
        if inner.current.as_deref() == Some(id) {
            inner.current = None;
        }
        tracing::info!(session = %id, "session ended");
        Ok(())
    }

    /// The active session, starting one if none is active.
    pub fn current_session(&self) -> Result<Session, LedgerError> {
        let mut inner = self.lock();
        current_or_start(&mut inner)
    }

    pub fn get_session(&self, id: &str) -> Result<Option<Session>, LedgerError> {
        let inner = self.lock();
        select_session(&inner.conn, id)
    }

    /// Append one apply record to the current session.
    pub fn record_apply(&self, apply: NewApply) -> Result<ApplyRecord, LedgerError> {
        let mut inner = self.lock();
        let session = current_or_start(&mut inner)?;
        let record = ApplyRecord {
            id: Uuid::new_v4().to_string(),
            session_id: session.id,
            ts: Utc::now(),
            files_changed: apply.files_changed,
            backup_path: apply.backup_path,
            patch_path: apply.patch_path,
            source_revision: apply.source_revision,
        };
        inner.conn.execute(
            "INSERT INTO apply_records (id, session_id, ts, patch_path, git_sha, files_changed, backup_path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id,
                record.session_id,
                format_ts(record.ts),
                record.patch_path,
                record.source_revision,
                serde_json::to_string(&record.files_changed)?,
                record.backup_path,
            ],
        )?;
        tracing::info!(
            record = %record.id,
            session = %record.session_id,
            files = record.files_changed.len(),
            "apply recorded"
        );
        Ok(record)
    }

    /// The `n` most recent apply records across all sessions, newest first.
    pub fn last_apply_records(&self, n: usize) -> Result<Vec<ApplyRecord>, LedgerError> {
        let inner = self.lock();
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM apply_records ORDER BY ts DESC, rowid DESC LIMIT ?1"
        );
        let mut stmt = inner.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![n as i64], read_record)?;
        collect_records(rows)
    }

    pub fn apply_records_for_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<ApplyRecord>, LedgerError> {
        let inner = self.lock();
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM apply_records WHERE session_id = ?1 ORDER BY ts DESC, rowid DESC"
        );
        let mut stmt = inner.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![session_id], read_record)?;
        collect_records(rows)
    }

    /// Delete ended sessions started more than `days` ago, with their
    /// records. Returns the number of sessions removed.
    pub fn cleanup(&self, days: u32) -> Result<usize, LedgerError> {
        self.cleanup_before(Utc::now() - Duration::days(i64::from(days)))
    }

    pub fn cleanup_before(&self, cutoff: DateTime<Utc>) -> Result<usize, LedgerError> {
        let mut inner = self.lock();
        let cutoff = format_ts(cutoff);
        let tx = inner.conn.transaction()?;
        tx.execute(
            "DELETE FROM apply_records WHERE session_id IN
                (SELECT id FROM sessions WHERE started_at < ?1 AND ended_at IS NOT NULL)",
            params![cutoff],
        )?;
        let removed = tx.execute(
            "DELETE FROM sessions WHERE started_at < ?1 AND ended_at IS NOT NULL",
            params![cutoff],
        )?;
        tx.commit()?;
        if removed > 0 {
            tracing::info!(removed, "ledger cleanup");
        }
        Ok(removed)
    }
}

fn current_or_start(inner: &mut Inner) -> Result<Session, LedgerError> {
    if let Some(id) = inner.current.clone() {
        if let Some(session) = select_session(&inner.conn, &id)? {
            return Ok(session);
        }
    }
    let session = insert_session(&inner.conn, None)?;
    inner.current = Some(session.id.clone());
    Ok(session)
}

fn insert_session(conn: &Connection, user_id: Option<&str>) -> Result<Session, LedgerError> {
    let session = Session {
        id: Uuid::new_v4().to_string(),
        started_at: Utc::now(),
        ended_at: None,
        user_id: user_id.map(str::to_string),
    };
    conn.execute(
        "INSERT INTO sessions (id, started_at, user_id) VALUES (?1, ?2, ?3)",
        params![session.id, format_ts(session.started_at), session.user_id],
    )?;
    tracing::info!(session = %session.id, "session started");
    Ok(session)
}

fn select_session(conn: &Connection, id: &str) -> Result<Option<Session>, LedgerError> {
    let row = conn
        .query_row(
            "SELECT id, started_at, ended_at, user_id FROM sessions WHERE id = ?1",
            params![id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            },
        )
        .optional()?;
    match row {
        None => Ok(None),
        Some((id, started_at, ended_at, user_id)) => Ok(Some(Session {
            id,
            started_at: parse_ts(&started_at)?,
            ended_at: ended_at.as_deref().map(parse_ts).transpose()?,
            user_id,
        })),
    }
}

/// Raw columns, converted outside the rusqlite closure so timestamp and
/// JSON failures surface as `LedgerError`.
struct RawRecord {
    id: String,
    session_id: String,
    ts: String,
    patch_path: Option<String>,
    git_sha: Option<String>,
    files_changed: String,
    backup_path: Option<String>,
}

fn read_record(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok(RawRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        ts: row.get(2)?,
        patch_path: row.get(3)?,
        git_sha: row.get(4)?,
        files_changed: row.get(5)?,
        backup_path: row.get(6)?,
    })
}

fn collect_records(
    rows: impl Iterator<Item = rusqlite::Result<RawRecord>>,
) -> Result<Vec<ApplyRecord>, LedgerError> {
    let mut records = Vec::new();
    for raw in rows {
        let raw = raw?;
        records.push(ApplyRecord {
            ts: parse_ts(&raw.ts)?,
            files_changed: serde_json::from_str(&raw.files_changed)?,
            id: raw.id,
            session_id: raw.session_id,
            backup_path: raw.backup_path,
            patch_path: raw.patch_path,
            source_revision: raw.git_sha,
        });
    }
    Ok(records)
}

/// Fixed-width UTC timestamps so text ordering in SQL is chronological.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, LedgerError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| LedgerError::CorruptTimestamp(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn current_session_starts_lazily_and_is_stable() {
        let ledger = SessionLedger::open_in_memory().unwrap();
        let a = ledger.current_session().unwrap();
        let b = ledger.current_session().unwrap();
        assert_eq!(a.id, b.id);
        assert!(a.ended_at.is_none());
    }

    #[test]
    fn end_session_clears_current() {
        let ledger = SessionLedger::open_in_memory().unwrap();
        let s = ledger.start_session(Some("dev")).unwrap();
        assert_eq!(s.user_id.as_deref(), Some("dev"));
        ledger.end_session(&s.id).unwrap();

        let stored = ledger.get_session(&s.id).unwrap().unwrap();
        assert!(stored.ended_at.is_some());
        assert_ne!(ledger.current_session().unwrap().id, s.id);
    }

    #[test]
    fn ending_unknown_session_fails() {
        let ledger = SessionLedger::open_in_memory().unwrap();
        assert!(matches!(
            ledger.end_session("nope"),
            Err(LedgerError::SessionNotFound(_))
        ));
    }

    #[test]
    fn last_records_are_newest_first() {
        let ledger = SessionLedger::open_in_memory().unwrap();
        for name in ["a.rs", "b.rs", "c.rs"] {
            ledger
                .record_apply(NewApply::new(vec![name.to_string()]).with_backup("m.json"))
                .unwrap();
        }
        let last = ledger.last_apply_records(2).unwrap();
        assert_eq!(last.len(), 2);
        assert_eq!(last[0].files_changed, vec!["c.rs"]);
        assert_eq!(last[1].files_changed, vec!["b.rs"]);
        assert_eq!(last[0].backup_path.as_deref(), Some("m.json"));
    }

    #[test]
    fn records_are_grouped_by_session() {
        let ledger = SessionLedger::open_in_memory().unwrap();
        let first = ledger.start_session(None).unwrap();
        ledger.record_apply(NewApply::new(vec!["x".into()])).unwrap();
        ledger.start_session(None).unwrap();
        ledger
            .record_apply(NewApply::new(vec!["y".into()]).with_source_revision("abc123"))
            .unwrap();

        let records = ledger.apply_records_for_session(&first.id).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].files_changed, vec!["x"]);
        assert_eq!(
            ledger.last_apply_records(1).unwrap()[0].source_revision.as_deref(),
            Some("abc123")
        );
    }

    #[test]
    fn cleanup_only_removes_ended_sessions() {
        let ledger = SessionLedger::open_in_memory().unwrap();
        let ended = ledger.start_session(None).unwrap();
        ledger.record_apply(NewApply::new(vec!["x".into()])).unwrap();
        ledger.end_session(&ended.id).unwrap();
        let open = ledger.start_session(None).unwrap();

        let removed = ledger
            .cleanup_before(Utc::now() + Duration::seconds(1))
            .unwrap();
        assert_eq!(removed, 1);
        assert!(ledger.get_session(&ended.id).unwrap().is_none());
        assert!(ledger.get_session(&open.id).unwrap().is_some());
        assert!(ledger.last_apply_records(10).unwrap().is_empty());
        // Recent sessions survive the age-based cleanup.
        assert_eq!(ledger.cleanup(14).unwrap(), 0);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".nexxon").join("session.sqlite");
        {
            let ledger = SessionLedger::open(&path).unwrap();
            ledger.record_apply(NewApply::new(vec!["kept.rs".into()])).unwrap();
        }
        let ledger = SessionLedger::open(&path).unwrap();
        let records = ledger.last_apply_records(5).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].files_changed, vec!["kept.rs"]);
    }
}
