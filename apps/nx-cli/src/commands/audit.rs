// audit.rs - Audit subcommands: verify, tail.
//
// These read the log file directly, so they work without a running runtime.

use std::path::PathBuf;

use clap::Subcommand;
use nx_audit::{Actor, AuditEntry, AuditError, AuditLog, Decision};
use nx_runtime::RuntimeConfig;

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Verify the audit log hash chain integrity.
    Verify {
        /// Path to audit log (defaults to .nexxon/audit.log).
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Show recent audit entries.
    Tail {
        /// Path to audit log (defaults to .nexxon/audit.log).
        #[arg(long)]
        log: Option<PathBuf>,
        /// Number of entries to show.
        #[arg(short, default_value = "10")]
        n: usize,
    },
}

pub fn execute(cmd: &AuditCommands, config: &RuntimeConfig) -> anyhow::Result<()> {
    match cmd {
        AuditCommands::Verify { log } => {
            let path = log.clone().unwrap_or_else(|| config.audit_log.clone());
            if !path.exists() {
                println!("No audit log found at {}", path.display());
                return Ok(());
            }

            match AuditLog::verify_chain(&path) {
                Ok(_) => {
                    let entries = AuditLog::read_all(&path)?;
                    println!(
                        "Audit log verified: {} entr{}, hash chain intact.",
                        entries.len(),
                        if entries.len() == 1 { "y" } else { "ies" }
                    );
                }
                Err(AuditError::IntegrityViolation {
                    line,
                    expected,
                    actual,
                }) => {
                    println!("INTEGRITY VIOLATION at line {}:", line);
                    println!("  Expected previous_hash: {}", expected);
                    println!("  Actual previous_hash:   {}", actual);
                    println!();
                    println!("The audit log may have been tampered with.");
                    anyhow::bail!("Audit log integrity check failed");
                }
                Err(e) => return Err(e.into()),
            }
        }

        AuditCommands::Tail { log, n } => {
            let path = log.clone().unwrap_or_else(|| config.audit_log.clone());
            if !path.exists() {
                println!("No audit log found at {}", path.display());
                return Ok(());
            }

            let entries = AuditLog::read_all(&path)?;
            let start = entries.len().saturating_sub(*n);
            let recent = &entries[start..];

            if recent.is_empty() {
                println!("No audit entries.");
                return Ok(());
            }

            println!(
                "{:<20} {:<6} {:<10} {:<8} TARGET",
                "TIMESTAMP", "ACTOR", "ACTION", "DECISION"
            );
            println!("{}", "-".repeat(80));
            for entry in recent {
                println!("{}", row(entry));
            }
        }
    }

    Ok(())
}

fn row(entry: &AuditEntry) -> String {
    let actor = match entry.actor {
        Actor::User => "user",
        Actor::Agent => "agent",
    };
    let decision = match entry.policy.as_ref().map(|p| p.decision) {
        Some(Decision::Allow) => "allow",
        Some(Decision::Deny) => "deny",
        Some(Decision::Confirm) => "confirm",
        None => "-",
    };
    let target = entry
        .target
        .as_ref()
        .and_then(|t| t.path.as_deref())
        .unwrap_or("-");
    format!(
        "{:<20} {:<6} {:<10} {:<8} {}",
        entry.ts.format("%Y-%m-%d %H:%M:%S"),
        actor,
        entry.action,
        decision,
        target
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use nx_audit::ResultStatus;

    #[test]
    fn row_shows_decision_and_target() {
        let entry = AuditEntry::new(Actor::User, "apply")
            .with_target(Some("src/lib.rs".into()), Some("write".into()))
            .with_policy(Decision::Deny, Some("fs.deny".into()))
            .with_result(ResultStatus::Error, None);
        let line = row(&entry);
        assert!(line.contains("user"));
        assert!(line.contains("apply"));
        assert!(line.contains("deny"));
        assert!(line.ends_with("src/lib.rs"));
    }

    #[test]
    fn missing_log_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = RuntimeConfig::for_project(dir.path());
        execute(&AuditCommands::Verify { log: None }, &config).unwrap();
        execute(&AuditCommands::Tail { log: None, n: 5 }, &config).unwrap();
    }
}
