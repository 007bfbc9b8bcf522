// request.rs - Envelope commands: build a request, send it, render the reply.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Subcommand, ValueEnum};
use serde_json::Value;

use nx_policy::{OverrideMode, PolicyFragment};
use nx_protocol::{Command, ExitCode, PolicyDirective, RequestEnvelope, ResponseEnvelope};

use crate::client::RuntimeClient;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Mode {
    Restrictive,
    Admin,
}

impl From<Mode> for OverrideMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Restrictive => OverrideMode::Restrictive,
            Mode::Admin => OverrideMode::Admin,
        }
    }
}

#[derive(Subcommand)]
pub enum RequestCommand {
    /// Ask the provider for a step-by-step plan.
    Plan {
        task: String,
        /// Provider to use instead of the default.
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        max_tokens: Option<u64>,
    },
    /// Propose new content for a file and show it as a unified diff.
    Diff {
        file: String,
        task: String,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        max_tokens: Option<u64>,
    },
    /// Write a file through the runtime so it can be undone.
    Apply {
        file: String,
        /// New content, inline.
        #[arg(long, conflicts_with = "from")]
        content: Option<String>,
        /// Read new content from this local file.
        #[arg(long)]
        from: Option<PathBuf>,
        /// Show the patch without writing anything.
        #[arg(long)]
        dry_run: bool,
    },
    /// Run the test command.
    Test {
        /// Command to run (defaults to the runtime's configured command).
        #[arg(long)]
        cmd: Option<String>,
        /// Timeout in milliseconds.
        #[arg(long)]
        timeout: Option<u64>,
        /// Confirm a command the policy marks as needing confirmation.
        #[arg(long)]
        yes: bool,
    },
    /// Search project files.
    Search {
        query: String,
        /// Use semantic search when available.
        #[arg(long)]
        semantic: bool,
    },
    /// List the files the policy lets the agent see.
    Index {
        /// Also build the semantic index.
        #[arg(long)]
        vectors: bool,
    },
    /// Show recent audit entries.
    Log {
        #[arg(long, default_value = "50")]
        limit: u64,
    },
    /// Show the caller identity and active policy hash.
    Whoami {
        /// Include decisions for a fixed set of sample subjects.
        #[arg(long)]
        policy_trace: bool,
    },
    /// Revert the most recent applies.
    Undo {
        #[arg(long, default_value = "1")]
        steps: u64,
    },
    /// Check a policy override (YAML or JSON fragment) against the project policy.
    Validate {
        #[arg(long)]
        overrides: Option<PathBuf>,
        #[arg(long, value_enum, default_value = "restrictive")]
        mode: Mode,
        #[arg(long)]
        reason: Option<String>,
    },
}

impl RequestCommand {
    pub fn command(&self) -> Command {
        match self {
            RequestCommand::Plan { .. } => Command::Plan,
            RequestCommand::Diff { .. } => Command::Diff,
            RequestCommand::Apply { .. } => Command::Apply,
            RequestCommand::Test { .. } => Command::Test,
            RequestCommand::Search { .. } => Command::Search,
            RequestCommand::Index { .. } => Command::Index,
            RequestCommand::Log { .. } => Command::Log,
            RequestCommand::Whoami { .. } => Command::Whoami,
            RequestCommand::Undo { .. } => Command::Undo,
            RequestCommand::Validate { .. } => Command::Validate,
        }
    }

    pub fn to_envelope(&self) -> anyhow::Result<RequestEnvelope> {
        let mut req = RequestEnvelope::new(self.command());
        match self {
            RequestCommand::Plan {
                task,
                model,
                max_tokens,
            } => {
                req = req.with_arg("task", task.as_str());
                req = with_optional(req, "model", model.clone());
                req = with_optional(req, "max_tokens", *max_tokens);
            }
            RequestCommand::Diff {
                file,
                task,
                model,
                max_tokens,
            } => {
                req = req.with_arg("file", file.as_str()).with_arg("task", task.as_str());
                req = with_optional(req, "model", model.clone());
                req = with_optional(req, "max_tokens", *max_tokens);
            }
            RequestCommand::Apply {
                file,
                content,
                from,
                dry_run,
            } => {
                let content = match (content, from) {
                    (Some(inline), _) => inline.clone(),
                    (None, Some(path)) => std::fs::read_to_string(path)
                        .with_context(|| format!("failed to read {}", path.display()))?,
                    (None, None) => anyhow::bail!("apply needs --content or --from"),
                };
                req = req
                    .with_arg("file", file.as_str())
                    .with_arg("content", content)
                    .with_arg("dry_run", *dry_run);
            }
            RequestCommand::Test { cmd, timeout, yes } => {
                req = with_optional(req, "cmd", cmd.clone());
                req = with_optional(req, "timeout", *timeout);
                if *yes {
                    req = req.with_arg("confirmed", true);
                }
            }
            RequestCommand::Search { query, semantic } => {
                req = req.with_arg("q", query.as_str()).with_arg("semantic", *semantic);
            }
            RequestCommand::Index { vectors } => {
                req = req.with_arg("vectors", *vectors);
            }
            RequestCommand::Log { limit } => {
                req = req.with_arg("limit", *limit);
            }
            RequestCommand::Whoami { policy_trace } => {
                req = req.with_arg("policy_trace", *policy_trace);
            }
            RequestCommand::Undo { steps } => {
                req = req.with_arg("steps", *steps);
            }
            RequestCommand::Validate {
                overrides,
                mode,
                reason,
            } => {
                let overrides = overrides.as_deref().map(load_fragment).transpose()?;
                req = req.with_policy(PolicyDirective {
                    overrides,
                    override_mode: (*mode).into(),
                    override_reason: reason.clone(),
                });
            }
        }
        Ok(req)
    }
}

fn with_optional<T: Into<Value>>(req: RequestEnvelope, key: &str, value: Option<T>) -> RequestEnvelope {
    match value {
        Some(v) => req.with_arg(key, v),
        None => req,
    }
}

/// YAML is a superset of JSON, so one parser reads both.
fn load_fragment(path: &Path) -> anyhow::Result<PolicyFragment> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("invalid policy fragment in {}", path.display()))
}

pub fn execute(cmd: &RequestCommand, client: &RuntimeClient, json: bool) -> anyhow::Result<ExitCode> {
    let request = cmd.to_envelope()?;
    let response = client.send(&request)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        render(cmd.command(), &response);
    }
    Ok(ExitCode::for_response(cmd.command(), &response))
}

fn render(command: Command, response: &ResponseEnvelope) {
    if let Some(error) = &response.error {
        eprintln!("error [{}]: {}", error.code, error.message);
        for suggestion in &error.help.suggestions {
            eprintln!("  - {}", suggestion);
        }
        eprintln!("  docs: {}", error.help.docs);
        return;
    }
    let Some(result) = &response.result else {
        return;
    };
    for line in summary(command, result) {
        println!("{}", line);
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

/// Human-readable lines for a successful result.
fn summary(command: Command, result: &Value) -> Vec<String> {
    let mut out = Vec::new();
    match command {
        Command::Plan => {
            if let Some(steps) = result["plan_steps"].as_array() {
                for (i, step) in steps.iter().enumerate() {
                    out.push(format!("{}. {}", i + 1, text(step)));
                }
            }
            out.push(format!("confidence: {}", text(&result["confidence"])));
            if result["provider_error"].is_object() {
                out.push(format!(
                    "provider error: {} (fallback plan)",
                    text(&result["provider_error"]["message"])
                ));
            }
        }
        Command::Diff => {
            if result["has_changes"].as_bool() == Some(true) {
                out.push(text(&result["patch"]));
            } else {
                out.push(format!("No changes proposed for {}", text(&result["file"])));
            }
        }
        Command::Apply => {
            if result["applied"].as_bool() == Some(true) {
                out.push(format!("Applied {} (record {})", text(&result["file"]), text(&result["record_id"])));
            } else {
                out.push(format!("Dry run for {}:", text(&result["file"])));
                out.push(text(&result["patch"]));
            }
        }
        Command::Test => {
            let stdout = text(&result["stdout"]);
            if !stdout.is_empty() {
                out.push(stdout);
            }
            let stderr = text(&result["stderr"]);
            if !stderr.is_empty() {
                out.push(stderr);
            }
            let verdict = if result["success"].as_bool() == Some(true) {
                "passed"
            } else {
                "failed"
            };
            out.push(format!("Tests {} (exit {})", verdict, text(&result["exit_code"])));
        }
        Command::Search => {
            for m in result["matches"].as_array().into_iter().flatten() {
                match m.get("line") {
                    Some(line) => out.push(format!("{}:{}: {}", text(&m["file"]), line, text(&m["text"]))),
                    None => out.push(format!("{} ({}): {}", text(&m["file"]), text(&m["relevance"]), text(&m["text"]))),
                }
            }
            if let Some(note) = result["note"].as_str() {
                out.push(format!("note: {}", note));
            }
        }
        Command::Index => {
            out.push(format!("{} file(s) indexed", text(&result["indexed_files"])));
            for file in result["files"].as_array().into_iter().flatten() {
                out.push(format!("  {}", text(file)));
            }
        }
        Command::Log => {
            for entry in result["entries"].as_array().into_iter().flatten() {
                out.push(format!(
                    "{:<28} {:<6} {:<10} {}",
                    text(&entry["ts"]),
                    text(&entry["actor"]),
                    text(&entry["action"]),
                    entry["target"]["path"].as_str().unwrap_or("-"),
                ));
            }
        }
        Command::Whoami => {
            out.push(format!("user:   {}", text(&result["identity"]["sub"])));
            out.push(format!("org:    {}", text(&result["identity"]["org"])));
            out.push(format!("policy: {}", text(&result["policy_hash"])));
            for row in result["policy_trace"]["decisions"].as_array().into_iter().flatten() {
                out.push(format!(
                    "  {} {} -> {} ({})",
                    text(&row["action"]),
                    text(&row["subject"]),
                    text(&row["decision"]),
                    text(&row["rule"]),
                ));
            }
        }
        Command::Undo => match result["message"].as_str() {
            Some(message) => out.push(message.to_string()),
            None => {
                out.push(format!(
                    "Reverted {} step(s) via {}",
                    text(&result["steps"]),
                    text(&result["method"])
                ));
                for conflict in result["conflicts"].as_array().into_iter().flatten() {
                    out.push(format!("  conflict: {}", text(conflict)));
                }
            }
        },
        Command::Validate => {
            out.push(format!(
                "Override valid; effective hash {}",
                text(&result["policy_trace"]["effective_hash"])
            ));
        }
        Command::Unknown => out.push(result.to_string()),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn apply_reads_content_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("new.rs");
        std::fs::write(&source, "fn main() {}\n").unwrap();

        let cmd = RequestCommand::Apply {
            file: "src/main.rs".into(),
            content: None,
            from: Some(source),
            dry_run: true,
        };
        let req = cmd.to_envelope().unwrap();
        assert_eq!(req.command, Command::Apply);
        assert_eq!(req.arg_str("content"), Some("fn main() {}\n"));
        assert!(req.arg_bool("dry_run"));
    }

    #[test]
    fn apply_without_content_is_rejected_locally() {
        let cmd = RequestCommand::Apply {
            file: "a".into(),
            content: None,
            from: None,
            dry_run: false,
        };
        assert!(cmd.to_envelope().is_err());
    }

    #[test]
    fn validate_carries_override_fragment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("override.yaml");
        std::fs::write(&path, "limits:\n  tokens_per_session: 5000\n").unwrap();

        let cmd = RequestCommand::Validate {
            overrides: Some(path),
            mode: Mode::Admin,
            reason: Some("load test".into()),
        };
        let req = cmd.to_envelope().unwrap();
        let policy = req.policy.unwrap();
        assert_eq!(policy.override_mode, OverrideMode::Admin);
        assert_eq!(
            policy.overrides.unwrap().limits.unwrap().tokens_per_session,
            Some(5000)
        );
    }

    #[test]
    fn test_flags_map_to_args() {
        let cmd = RequestCommand::Test {
            cmd: Some("cargo test".into()),
            timeout: Some(1000),
            yes: true,
        };
        let req = cmd.to_envelope().unwrap();
        assert_eq!(req.arg_str("cmd"), Some("cargo test"));
        assert_eq!(req.arg_u64("timeout"), Some(1000));
        assert!(req.arg_bool("confirmed"));
    }

    #[test]
    fn summaries_render_key_fields() {
        let lines = summary(
            Command::Test,
            &json!({ "stdout": "", "stderr": "boom", "exit_code": 1, "success": false }),
        );
        assert_eq!(lines, vec!["boom".to_string(), "Tests failed (exit 1)".to_string()]);

        let lines = summary(
            Command::Undo,
            &json!({ "reverted": false, "message": "No apply records to undo" }),
        );
        assert_eq!(lines, vec!["No apply records to undo".to_string()]);
    }
}
