// Runs the `nexxon` binary against real audit logs.

use std::process::Command;

use nx_audit::{Actor, AuditEntry, AuditLog};
use tempfile::tempdir;

fn nexxon() -> Command {
    Command::new(env!("CARGO_BIN_EXE_nexxon"))
}

fn write_log(path: &std::path::Path, actions: &[&str]) {
    let mut log = AuditLog::open(path).unwrap();
    for action in actions {
        log.append(&AuditEntry::new(Actor::User, *action)).unwrap();
    }
}

#[test]
fn verify_reports_an_intact_chain() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("audit.log");
    write_log(&path, &["index", "apply", "undo"]);

    let out = nexxon()
        .args(["audit", "verify", "--log"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("3 entries, hash chain intact"), "{stdout}");
}

#[test]
fn verify_fails_on_a_tampered_log() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("audit.log");
    write_log(&path, &["index", "apply", "undo"]);

    let text = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, text.replacen("\"apply\"", "\"plan\"", 1)).unwrap();

    let out = nexxon()
        .args(["audit", "verify", "--log"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(!out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("INTEGRITY VIOLATION at line 3"), "{stdout}");
}

#[test]
fn tail_uses_the_project_log_by_default() {
    let dir = tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join(".nexxon")).unwrap();
    write_log(&dir.path().join(".nexxon/audit.log"), &["index", "search"]);

    let out = nexxon()
        .args(["audit", "tail", "-n", "1", "--project-root"])
        .arg(dir.path())
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("search"));
    assert!(!stdout.contains("index"));
}

#[test]
fn unreachable_runtime_is_an_error() {
    let out = nexxon()
        .args(["--runtime-url", "http://127.0.0.1:9", "whoami"])
        .output()
        .unwrap();
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("could not reach the runtime"), "{stderr}");
}
