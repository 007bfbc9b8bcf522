// End-to-end dispatch: audit, policy gate, handler, and response shape.

use std::fs;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};

use nx_audit::{AuditLog, Decision};
use nx_ledger::SessionLedger;
use nx_policy::PolicyDocument;
use nx_protocol::{Command, ErrorCode, ExitCode, RequestEnvelope, ResponseEnvelope};
use nx_provider::{
    BreakerConfig, CompletionOptions, LlmProvider, ProviderError, ProviderRegistry,
};
use nx_runtime::{dispatch, dispatch_value, RuntimeConfig, RuntimeContext, NO_POLICY_HASH};

const POLICY: &str = r#"
version: 1
scope:
  fs:
    allow: ["./src", "./tests"]
    deny: ["./src/secrets"]
  network:
    outbound: ["api.openai.com"]
  exec:
    allow: ["echo", "false", "true"]
    confirm: ["--force"]
limits:
  tokens_per_session: 100000
  files_read_per_minute: 500
  bytes_read_per_minute: 10485760
redaction:
  patterns:
    - name: api_key
      regex: "sk-[A-Za-z0-9]+"
      action: redact
"#;

struct Harness {
    dir: TempDir,
    ctx: RuntimeContext,
}

impl Harness {
    fn new(policy: Option<&str>) -> Self {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        if let Some(policy) = policy {
            fs::write(dir.path().join("policy.yaml"), policy).unwrap();
        }
        let ctx = RuntimeContext::open(RuntimeConfig::for_project(dir.path())).unwrap();
        ctx.start().unwrap();
        Self { dir, ctx }
    }

    /// A context whose only provider always fails.
    fn with_failing_provider() -> Self {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("policy.yaml"), POLICY).unwrap();
        let config = RuntimeConfig::for_project(dir.path());
        let document = PolicyDocument::load(&config.policy_path).unwrap();
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(Down), BreakerConfig::default());
        let ledger = SessionLedger::open(&config.ledger_db).unwrap();
        let ctx = RuntimeContext::assemble(config, Some(document), registry, ledger).unwrap();
        ctx.start().unwrap();
        Self { dir, ctx }
    }

    fn path(&self, rel: &str) -> std::path::PathBuf {
        self.dir.path().join(rel)
    }

    async fn send(&self, req: RequestEnvelope) -> ResponseEnvelope {
        dispatch(&self.ctx, req).await
    }
}

struct Down;

#[async_trait]
impl LlmProvider for Down {
    fn name(&self) -> &str {
        "down"
    }

    async fn complete(&self, _: &str, _: &CompletionOptions) -> Result<String, ProviderError> {
        Err(ProviderError::Unavailable {
            provider: "down".into(),
            reason: "503 Service Unavailable".into(),
        })
    }

    async fn health_check(&self) -> bool {
        false
    }

    fn endpoint_host(&self) -> Option<String> {
        None
    }
}

fn error_code(resp: &ResponseEnvelope) -> ErrorCode {
    let number = resp.error.as_ref().and_then(|e| e.code_number()).unwrap();
    ErrorCode::from_u16(number).unwrap()
}

fn result(resp: &ResponseEnvelope) -> &Value {
    assert!(resp.is_ok(), "expected ok, got {:?}", resp.error);
    resp.result.as_ref().unwrap()
}

#[tokio::test]
async fn apply_to_denied_path_writes_nothing() {
    let h = Harness::new(Some(POLICY));
    let req = RequestEnvelope::new(Command::Apply)
        .with_arg("file", "src/secrets/key.txt")
        .with_arg("content", "leaked");

    let resp = h.send(req).await;

    assert_eq!(error_code(&resp), ErrorCode::PolicyDenied);
    assert!(!h.path("src/secrets/key.txt").exists());
    assert!(h.ctx.ledger.last_apply_records(10).unwrap().is_empty());
    assert_eq!(ExitCode::for_response(Command::Apply, &resp), ExitCode::PolicyDenied);

    let entries = AuditLog::read_all(&h.ctx.config.audit_log).unwrap();
    let denial = entries.last().unwrap();
    assert_eq!(denial.policy.as_ref().unwrap().decision, Decision::Deny);
    assert_eq!(denial.policy.as_ref().unwrap().rule.as_deref(), Some("fs.deny"));
}

#[tokio::test]
async fn apply_records_and_undo_reverts_two_steps() {
    let h = Harness::new(Some(POLICY));
    fs::write(h.path("src/a.rs"), "a0").unwrap();

    for (file, content) in [("src/a.rs", "a1"), ("src/b.rs", "b1")] {
        let resp = h
            .send(
                RequestEnvelope::new(Command::Apply)
                    .with_arg("file", file)
                    .with_arg("content", content),
            )
            .await;
        assert_eq!(result(&resp)["applied"], true);
    }
    assert_eq!(fs::read_to_string(h.path("src/a.rs")).unwrap(), "a1");
    assert_eq!(h.ctx.ledger.last_apply_records(10).unwrap().len(), 2);

    let resp = h
        .send(RequestEnvelope::new(Command::Undo).with_arg("steps", 2))
        .await;
    let undo = result(&resp);
    assert_eq!(undo["reverted"], true);
    assert_eq!(undo["steps"], 2);
    assert_eq!(fs::read_to_string(h.path("src/a.rs")).unwrap(), "a0");
    assert!(!h.path("src/b.rs").exists());
}

#[tokio::test]
async fn dry_run_apply_previews_without_side_effects() {
    let h = Harness::new(Some(POLICY));
    fs::write(h.path("src/a.rs"), "old\n").unwrap();

    let resp = h
        .send(
            RequestEnvelope::new(Command::Apply)
                .with_arg("file", "src/a.rs")
                .with_arg("content", "new\n")
                .with_arg("dry_run", true),
        )
        .await;

    let preview = result(&resp);
    assert_eq!(preview["applied"], false);
    assert!(preview["patch"].as_str().unwrap().contains("+new"));
    assert_eq!(fs::read_to_string(h.path("src/a.rs")).unwrap(), "old\n");
    assert!(h.ctx.ledger.last_apply_records(1).unwrap().is_empty());
}

#[tokio::test]
async fn undo_with_empty_ledger_reports_nothing_to_do() {
    let h = Harness::new(Some(POLICY));
    let resp = h.send(RequestEnvelope::new(Command::Undo)).await;
    assert_eq!(result(&resp)["reverted"], false);
    assert_eq!(result(&resp)["message"], "No apply records to undo");
}

#[tokio::test]
async fn missing_arguments_are_listed() {
    let h = Harness::new(Some(POLICY));
    let resp = h
        .send(RequestEnvelope::new(Command::Apply).with_arg("file", "src/a.rs"))
        .await;

    assert_eq!(error_code(&resp), ErrorCode::InvalidArgs);
    let details = resp.error.unwrap().details.unwrap();
    assert_eq!(details["missing"], json!(["content"]));
}

#[tokio::test]
async fn restrictive_override_cannot_raise_limits_but_admin_can() {
    let h = Harness::new(Some(POLICY));
    let overrides = json!({ "limits": { "tokens_per_session": 200000 } });

    let restrictive = dispatch_value(
        &h.ctx,
        json!({
            "id": "v1",
            "command": "validate",
            "policy": { "overrides": overrides, "override_mode": "restrictive" }
        }),
    )
    .await;
    assert_eq!(error_code(&restrictive), ErrorCode::PolicyInvalidOverride);
    let message = &restrictive.error.as_ref().unwrap().message;
    assert!(message.starts_with("Policy validation failed: "));
    assert!(message.contains("tokens_per_session"));
    assert!(!restrictive.error.as_ref().unwrap().retry.retryable);

    let admin = dispatch_value(
        &h.ctx,
        json!({
            "id": "v2",
            "command": "validate",
            "policy": { "overrides": overrides, "override_mode": "admin" }
        }),
    )
    .await;
    let hash = result(&admin)["policy_trace"]["effective_hash"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(hash.starts_with("sha256:"));
    assert_ne!(hash, h.ctx.effective_hash());

    // No override: the project policy's own hash.
    let plain = h.send(RequestEnvelope::new(Command::Validate)).await;
    assert_eq!(
        result(&plain)["policy_trace"]["effective_hash"],
        h.ctx.effective_hash()
    );
}

#[tokio::test]
async fn failing_test_command_is_an_ok_payload() {
    let h = Harness::new(Some(POLICY));
    let resp = h
        .send(RequestEnvelope::new(Command::Test).with_arg("cmd", "false"))
        .await;

    let run = result(&resp);
    assert_eq!(run["success"], false);
    assert_eq!(run["exit_code"], 1);
    assert_eq!(ExitCode::for_response(Command::Test, &resp), ExitCode::TestsFailed);
}

#[tokio::test]
async fn test_command_gated_by_exec_policy() {
    let h = Harness::new(Some(POLICY));

    let denied = h
        .send(RequestEnvelope::new(Command::Test).with_arg("cmd", "rm -rf src"))
        .await;
    assert_eq!(error_code(&denied), ErrorCode::PolicyDenied);
    assert!(h.path("src").exists());

    let unconfirmed = h
        .send(RequestEnvelope::new(Command::Test).with_arg("cmd", "echo --force"))
        .await;
    assert_eq!(error_code(&unconfirmed), ErrorCode::PolicyDenied);
    assert_eq!(
        unconfirmed.error.unwrap().details.unwrap()["rule"],
        "exec.confirm"
    );

    let confirmed = h
        .send(
            RequestEnvelope::new(Command::Test)
                .with_arg("cmd", "echo --force")
                .with_arg("confirmed", true),
        )
        .await;
    let run = result(&confirmed);
    assert_eq!(run["success"], true);
    assert!(run["stdout"].as_str().unwrap().contains("--force"));
}

#[tokio::test]
async fn audit_entries_are_redacted_on_disk() {
    let h = Harness::new(Some(POLICY));
    let resp = h
        .send(RequestEnvelope::new(Command::Test).with_arg("cmd", "echo sk-abc123XYZ"))
        .await;
    assert!(resp.is_ok());

    let raw = fs::read_to_string(&h.ctx.config.audit_log).unwrap();
    assert!(!raw.contains("sk-abc123XYZ"));
    assert!(raw.contains("***REDACTED***"));
    assert!(AuditLog::verify_chain(&h.ctx.config.audit_log).unwrap());
}

#[tokio::test]
async fn unknown_command_is_rejected() {
    let h = Harness::new(Some(POLICY));
    let resp = dispatch_value(&h.ctx, json!({ "id": "r1", "command": "frobnicate" })).await;

    assert_eq!(resp.id, "r1");
    assert_eq!(error_code(&resp), ErrorCode::UnknownCommand);
    assert_eq!(resp.error.unwrap().message, "Unknown command: frobnicate");
    assert!(resp.metrics.is_some());
}

#[tokio::test]
async fn malformed_envelope_is_invalid_args() {
    let h = Harness::new(Some(POLICY));
    let resp = dispatch_value(&h.ctx, json!({ "id": "r2", "args": {} })).await;
    assert_eq!(resp.id, "r2");
    assert_eq!(error_code(&resp), ErrorCode::InvalidArgs);
}

#[tokio::test]
async fn log_returns_most_recent_entries() {
    let h = Harness::new(Some(POLICY));
    h.send(RequestEnvelope::new(Command::Whoami)).await;
    h.send(RequestEnvelope::new(Command::Index)).await;

    let resp = h
        .send(RequestEnvelope::new(Command::Log).with_arg("limit", 2))
        .await;
    let entries = result(&resp)["entries"].as_array().unwrap().clone();
    assert_eq!(entries.len(), 2);
    // The log request itself is audited before the tail is read.
    assert_eq!(entries[1]["action"], "log");
    assert_eq!(entries[0]["action"], "index");
}

#[tokio::test]
async fn oversized_log_limit_is_clamped() {
    let h = Harness::new(Some(POLICY));
    h.send(RequestEnvelope::new(Command::Whoami)).await;

    let resp = h
        .send(RequestEnvelope::new(Command::Log).with_arg("limit", u64::MAX))
        .await;
    let entries = result(&resp)["entries"].as_array().unwrap().clone();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["action"], "whoami");
}

const WHOLE_PROJECT_POLICY: &str = r#"
version: 1
scope:
  fs:
    allow: ["."]
limits:
  tokens_per_session: 100000
  files_read_per_minute: 500
  bytes_read_per_minute: 10485760
"#;

const DOUBLE_STAR_POLICY: &str = r#"
version: 1
scope:
  fs:
    allow: ["**"]
limits:
  tokens_per_session: 100000
  files_read_per_minute: 500
  bytes_read_per_minute: 10485760
"#;

#[tokio::test]
async fn whole_project_allow_rules_stop_at_the_project_root() {
    for policy in [Some(WHOLE_PROJECT_POLICY), Some(DOUBLE_STAR_POLICY), None] {
        let h = Harness::new(policy);
        let elsewhere = tempdir().unwrap();
        let target = elsewhere.path().join("escaped.txt");

        let resp = h
            .send(
                RequestEnvelope::new(Command::Apply)
                    .with_arg("file", target.display().to_string())
                    .with_arg("content", "x"),
            )
            .await;
        assert_eq!(error_code(&resp), ErrorCode::PolicyDenied);
        assert!(!target.exists());
        assert!(h.ctx.ledger.last_apply_records(1).unwrap().is_empty());

        let audit = AuditLog::read_all(&h.ctx.config.audit_log).unwrap();
        let denial = audit.last().unwrap().policy.as_ref().unwrap();
        assert_eq!(denial.rule.as_deref(), Some("fs.outside_project"));

        // Inside the project the same rules still allow the write.
        let resp = h
            .send(
                RequestEnvelope::new(Command::Apply)
                    .with_arg("file", "notes.md")
                    .with_arg("content", "ok"),
            )
            .await;
        assert!(resp.is_ok(), "{:?}", resp.error);
        assert_eq!(fs::read_to_string(h.path("notes.md")).unwrap(), "ok");
    }
}

#[tokio::test]
async fn diff_denied_by_network_leaves_read_budget_untouched() {
    let policy = r#"
version: 1
scope:
  fs:
    allow: ["./src"]
limits:
  tokens_per_session: 100000
  files_read_per_minute: 1
  bytes_read_per_minute: 10485760
"#;
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("src/lib.rs"), "fn a() {}\n").unwrap();
    fs::write(dir.path().join("policy.yaml"), policy).unwrap();
    let config = RuntimeConfig::for_project(dir.path());
    let document = PolicyDocument::load(&config.policy_path).unwrap();
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(Remote), BreakerConfig::default());
    let ledger = SessionLedger::open(&config.ledger_db).unwrap();
    let ctx = RuntimeContext::assemble(config, Some(document), registry, ledger).unwrap();
    ctx.start().unwrap();

    let resp = dispatch(
        &ctx,
        RequestEnvelope::new(Command::Diff)
            .with_arg("file", "src/lib.rs")
            .with_arg("task", "rename"),
    )
    .await;
    assert_eq!(error_code(&resp), ErrorCode::PolicyDenied);

    // The single read allowed per minute is still available.
    let enforcer = ctx.enforcer.as_ref().unwrap();
    assert!(enforcer.check_file_read_limit(1).allowed);
}

/// A provider hosted somewhere the policy does not allow.
struct Remote;

#[async_trait]
impl LlmProvider for Remote {
    fn name(&self) -> &str {
        "remote"
    }

    async fn complete(&self, _: &str, _: &CompletionOptions) -> Result<String, ProviderError> {
        Ok("fn a() {}\n".into())
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn endpoint_host(&self) -> Option<String> {
        Some("llm.example.com".into())
    }
}

#[tokio::test]
async fn permissive_mode_without_policy() {
    let h = Harness::new(None);
    assert!(h.ctx.enforcer.is_none());

    let who = h
        .send(RequestEnvelope::new(Command::Whoami).with_arg("policy_trace", true))
        .await;
    assert_eq!(result(&who)["policy_hash"], NO_POLICY_HASH);
    assert_eq!(result(&who)["identity"]["sub"], "local");

    let resp = h
        .send(
            RequestEnvelope::new(Command::Apply)
                .with_arg("file", "notes/todo.md")
                .with_arg("content", "x"),
        )
        .await;
    assert!(resp.is_ok());
    assert!(h.path("notes/todo.md").exists());

    let validate = h.send(RequestEnvelope::new(Command::Validate)).await;
    assert_eq!(
        result(&validate)["policy_trace"]["effective_hash"],
        NO_POLICY_HASH
    );
}

#[tokio::test]
async fn whoami_trace_reports_sample_decisions() {
    let h = Harness::new(Some(POLICY));
    let resp = h
        .send(RequestEnvelope::new(Command::Whoami).with_arg("policy_trace", true))
        .await;
    let decisions = result(&resp)["policy_trace"]["decisions"]
        .as_array()
        .unwrap()
        .clone();
    assert_eq!(decisions.len(), 2);
    assert_eq!(decisions[0]["action"], "exec");
    assert_eq!(decisions[0]["decision"], "deny");
    assert_eq!(decisions[1]["action"], "network");
    assert_eq!(decisions[1]["decision"], "deny");
}

#[tokio::test]
async fn search_skips_denied_files() {
    let h = Harness::new(Some(POLICY));
    fs::create_dir_all(h.path("src/secrets")).unwrap();
    fs::write(h.path("src/lib.rs"), "pub struct Cache;\n").unwrap();
    fs::write(h.path("src/secrets/keys.rs"), "// cache key\n").unwrap();

    let resp = h
        .send(RequestEnvelope::new(Command::Search).with_arg("q", "CACHE"))
        .await;
    let found = result(&resp);
    let matches = found["matches"].as_array().unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0]["file"], "src/lib.rs");
    assert_eq!(matches[0]["line"], 1);

    let semantic = h
        .send(
            RequestEnvelope::new(Command::Search)
                .with_arg("q", "cache")
                .with_arg("semantic", true),
        )
        .await;
    assert_eq!(
        result(&semantic)["note"],
        "semantic unavailable; used text fallback"
    );
}

#[tokio::test]
async fn index_lists_only_visible_files() {
    let h = Harness::new(Some(POLICY));
    fs::create_dir_all(h.path("src/secrets")).unwrap();
    fs::write(h.path("src/lib.rs"), "").unwrap();
    fs::write(h.path("src/secrets/k.rs"), "").unwrap();
    fs::write(h.path("README.md"), "").unwrap();

    let resp = h
        .send(RequestEnvelope::new(Command::Index).with_arg("vectors", true))
        .await;
    let index = result(&resp);
    assert_eq!(index["indexed_files"], 1);
    assert_eq!(index["files"], json!(["src/lib.rs"]));
    assert!(index["vectors"]["error"].is_string());
}

#[tokio::test]
async fn plan_and_diff_with_mock_provider() {
    let h = Harness::new(Some(POLICY));
    fs::write(h.path("src/a.rs"), "fn a() {}\n").unwrap();

    let plan = h
        .send(RequestEnvelope::new(Command::Plan).with_arg("task", "add caching"))
        .await;
    let plan = result(&plan);
    assert_eq!(plan["provider"], "mock");
    assert!(!plan["plan_steps"].as_array().unwrap().is_empty());

    let diff = h
        .send(
            RequestEnvelope::new(Command::Diff)
                .with_arg("file", "src/a.rs")
                .with_arg("task", "add caching"),
        )
        .await;
    let diff = result(&diff);
    assert_eq!(diff["has_changes"], false);
    assert_eq!(diff["new_content"], "fn a() {}\n");
}

#[tokio::test]
async fn provider_failure_falls_back() {
    let h = Harness::with_failing_provider();
    fs::write(h.path("src/a.rs"), "fn a() {}\n").unwrap();

    let plan = h
        .send(RequestEnvelope::new(Command::Plan).with_arg("task", "t"))
        .await;
    let plan = result(&plan);
    assert_eq!(plan["confidence"], "low");
    assert_eq!(
        plan["provider_error"]["code"],
        ErrorCode::ProviderUnavailable.as_u16()
    );

    let diff = h
        .send(
            RequestEnvelope::new(Command::Diff)
                .with_arg("file", "src/a.rs")
                .with_arg("task", "t"),
        )
        .await;
    assert_eq!(result(&diff)["has_changes"], false);
    assert!(result(&diff)["provider_error"].is_object());
}

#[tokio::test]
async fn unknown_provider_is_an_error() {
    let h = Harness::new(Some(POLICY));
    let resp = h
        .send(
            RequestEnvelope::new(Command::Plan)
                .with_arg("task", "t")
                .with_arg("model", "nope"),
        )
        .await;
    assert_eq!(error_code(&resp), ErrorCode::ProviderUnavailable);
}

#[tokio::test]
async fn token_budget_is_enforced_before_the_provider() {
    let h = Harness::new(Some(POLICY));
    let resp = h
        .send(
            RequestEnvelope::new(Command::Plan)
                .with_arg("task", "t")
                .with_arg("max_tokens", 150000),
        )
        .await;
    assert_eq!(error_code(&resp), ErrorCode::PolicyLimitExceeded);
    assert_eq!(h.ctx.enforcer.as_ref().unwrap().tokens_used(), 0);
}
