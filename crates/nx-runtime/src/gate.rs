// gate.rs - Policy checks that run before a handler is invoked.
//
// Each command's side effects are checked up front: the file it reads or
// writes, the command it executes, the provider host it contacts, and the
// tokens it will spend. A denial short-circuits dispatch before any
// handler code runs.

use serde_json::json;

use nx_audit::Decision;
use nx_policy::{confine, PolicyEnforcer, Verdict};
use nx_protocol::{Command, ErrorCode, NexxonError, RequestEnvelope};
use nx_provider::{LlmProvider, DEFAULT_MAX_TOKENS};

use crate::context::RuntimeContext;

/// A request stopped by policy.
#[derive(Debug, Clone)]
pub struct Denial {
    pub error: NexxonError,
    pub decision: Decision,
    pub rule: Option<String>,
}

impl Denial {
    fn from_verdict(code: ErrorCode, subject: &str, verdict: Verdict) -> Self {
        let reason = verdict
            .reason
            .unwrap_or_else(|| "Denied by policy".to_string());
        Self {
            error: NexxonError::new(code, reason)
                .with_details(json!({ "subject": subject, "rule": verdict.rule })),
            decision: Decision::Deny,
            rule: verdict.rule,
        }
    }
}

#[derive(Debug)]
pub enum Gate {
    Pass,
    Deny(Denial),
}

/// Tokens a provider-backed request reserves before calling out.
pub fn requested_tokens(req: &RequestEnvelope) -> u64 {
    req.arg_u64("max_tokens").unwrap_or(DEFAULT_MAX_TOKENS)
}

/// Run the checks for `req`. File arguments must stay inside the project
/// even in permissive mode; every other check needs a policy.
///
/// Checks that only decide run before checks that charge a budget, so a
/// request denied for its path or host spends neither reads nor tokens.
///
/// `Err` is a failure unrelated to policy, such as an unknown provider.
pub fn preflight(ctx: &RuntimeContext, req: &RequestEnvelope) -> Result<Gate, NexxonError> {
    if matches!(req.command, Command::Apply | Command::Diff) {
        if let Some(denial) = check_confined(ctx, req) {
            return Ok(Gate::Deny(denial));
        }
    }
    let Some(enforcer) = &ctx.enforcer else {
        return Ok(Gate::Pass);
    };

    let gate = match req.command {
        Command::Apply => check_file(ctx, enforcer, req),
        Command::Diff => match check_file(ctx, enforcer, req) {
            Some(denial) => Some(denial),
            None => {
                let provider = ctx.provider_for(req.arg_str("model"))?;
                check_host(enforcer, provider.as_ref())
                    .or_else(|| check_read_limit(ctx, enforcer, req))
                    .or_else(|| check_tokens(enforcer, req, provider.as_ref()))
            }
        },
        Command::Plan => {
            let provider = ctx.provider_for(req.arg_str("model"))?;
            check_host(enforcer, provider.as_ref())
                .or_else(|| check_tokens(enforcer, req, provider.as_ref()))
        }
        Command::Test => check_test(ctx, enforcer, req),
        _ => None,
    };
    Ok(gate.map_or(Gate::Pass, Gate::Deny))
}

fn file_arg(ctx: &RuntimeContext, req: &RequestEnvelope) -> Option<String> {
    // A missing argument is reported by the handler.
    req.arg_str("file").map(|raw| ctx.relative_path(raw))
}

fn check_confined(ctx: &RuntimeContext, req: &RequestEnvelope) -> Option<Denial> {
    let file = file_arg(ctx, req)?;
    confine(&file).map(|verdict| Denial::from_verdict(ErrorCode::PolicyDenied, &file, verdict))
}

fn check_file(ctx: &RuntimeContext, enforcer: &PolicyEnforcer, req: &RequestEnvelope) -> Option<Denial> {
    let file = file_arg(ctx, req)?;
    let verdict = enforcer.check_fs_access(&file);
    (!verdict.allowed).then(|| Denial::from_verdict(ErrorCode::PolicyDenied, &file, verdict))
}

fn check_read_limit(
    ctx: &RuntimeContext,
    enforcer: &PolicyEnforcer,
    req: &RequestEnvelope,
) -> Option<Denial> {
    let file = file_arg(ctx, req)?;
    let bytes = std::fs::metadata(ctx.resolve(&file))
        .map(|m| m.len())
        .unwrap_or(0);
    let verdict = enforcer.check_file_read_limit(bytes);
    (!verdict.allowed)
        .then(|| Denial::from_verdict(ErrorCode::PolicyLimitExceeded, &file, verdict))
}

fn check_host(enforcer: &PolicyEnforcer, provider: &dyn LlmProvider) -> Option<Denial> {
    let host = provider.endpoint_host()?;
    let verdict = enforcer.check_network(&host);
    (!verdict.allowed).then(|| Denial::from_verdict(ErrorCode::PolicyDenied, &host, verdict))
}

fn check_tokens(
    enforcer: &PolicyEnforcer,
    req: &RequestEnvelope,
    provider: &dyn LlmProvider,
) -> Option<Denial> {
    let verdict = enforcer.check_token_limit(requested_tokens(req));
    (!verdict.allowed).then(|| {
        Denial::from_verdict(ErrorCode::PolicyLimitExceeded, provider.name(), verdict)
    })
}

fn check_test(
    ctx: &RuntimeContext,
    enforcer: &PolicyEnforcer,
    req: &RequestEnvelope,
) -> Option<Denial> {
    let cmd = req.arg_str("cmd").unwrap_or(&ctx.config.test_command);
    let verdict = enforcer.check_exec(cmd);
    if !verdict.allowed {
        let reason = verdict
            .reason
            .unwrap_or_else(|| format!("Command not allowed: {}", cmd));
        return Some(Denial {
            error: NexxonError::policy_denied(reason)
                .with_details(json!({ "subject": cmd, "rule": "exec.allow" })),
            decision: Decision::Deny,
            rule: Some("exec.allow".to_string()),
        });
    }
    if verdict.requires_confirm && !req.arg_bool("confirmed") {
        return Some(Denial {
            error: NexxonError::policy_denied(format!(
                "Command requires confirmation: {}. Resend with confirmed=true",
                cmd
            ))
            .with_details(json!({ "subject": cmd, "rule": "exec.confirm" })),
            decision: Decision::Confirm,
            rule: Some("exec.confirm".to_string()),
        });
    }
    None
}
