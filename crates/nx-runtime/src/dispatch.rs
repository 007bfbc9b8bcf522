// dispatch.rs - The single path every request takes through the runtime.
//
// 1. Audit the request (redacted before it reaches disk).
// 2. Run the policy gate for the command's side effects.
// 3. On denial, audit the decision and answer with an error; the handler
//    never runs.
// 4. Otherwise run the handler and normalize whatever it returns into a
//    response envelope with latency metrics.

use std::time::Instant;

use serde_json::Value;

use nx_audit::{Actor, AuditEntry, Decision, ResultStatus};
use nx_protocol::{
    Command, ErrorCategory, ErrorCode, NexxonError, RequestEnvelope, ResponseEnvelope,
};

use crate::context::RuntimeContext;
use crate::error::IntoNexxonError;
use crate::gate::{preflight, Denial, Gate};
use crate::handlers::{self, HandlerResult};

/// Dispatch an untyped JSON body.
///
/// Bodies that are not a valid envelope get an `INVALID_ARGS` response and
/// unknown commands get `UNKNOWN_COMMAND`; neither reaches a handler.
pub async fn dispatch_value(ctx: &RuntimeContext, body: Value) -> ResponseEnvelope {
    let started = Instant::now();
    let id = body
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let raw_command = body
        .get("command")
        .and_then(Value::as_str)
        .map(str::to_string);

    match RequestEnvelope::from_value(body) {
        Ok(req) if req.command == Command::Unknown => {
            let name = raw_command.unwrap_or_default();
            let err = NexxonError::new(
                ErrorCode::UnknownCommand,
                format!("Unknown command: {}", name),
            )
            .with_context(name.as_str(), req.args.clone());
            record(ctx, failure_entry(&name, None, &err));
            ResponseEnvelope::error(req.id, &err).with_latency(elapsed_ms(started))
        }
        Ok(req) => dispatch(ctx, req).await,
        Err(err) => {
            tracing::debug!(error = %err.message, "malformed request envelope");
            ResponseEnvelope::error(id, &err).with_latency(elapsed_ms(started))
        }
    }
}

/// Dispatch a parsed request.
pub async fn dispatch(ctx: &RuntimeContext, req: RequestEnvelope) -> ResponseEnvelope {
    let started = Instant::now();
    let command = req.command.as_str();
    let target = audit_target(ctx, &req);

    let entry =
        AuditEntry::new(Actor::User, command).with_target(target.clone(), target_op(req.command));
    if let Err(e) = ctx.audit(&entry) {
        tracing::error!(error = %e, command, "audit append failed, request refused");
        let err = e.into_nexxon().with_context(command, req.args.clone());
        return ResponseEnvelope::error(req.id, &err).with_latency(elapsed_ms(started));
    }

    let (outcome, denied) = match preflight(ctx, &req) {
        Ok(Gate::Pass) => (run_handler(ctx, &req).await, false),
        Ok(Gate::Deny(denial)) => {
            tracing::info!(command, rule = ?denial.rule, "request denied by policy");
            record(ctx, denial_entry(command, target.clone(), &denial));
            (Err(denial.error), true)
        }
        Err(err) => (Err(err), false),
    };

    let response = match outcome {
        Ok(result) => ResponseEnvelope::ok(req.id.clone(), result),
        Err(mut err) => {
            if err.context.command == "unknown" {
                err = err.with_context(command, req.args.clone());
            }
            if !denied {
                // Policy errors raised inside a handler (read limits mid-search,
                // rejected overrides) are audited like gate denials.
                let entry = if err.category == ErrorCategory::Policy {
                    let denial = Denial {
                        error: err.clone(),
                        decision: Decision::Deny,
                        rule: rule_of(&err),
                    };
                    denial_entry(command, target.clone(), &denial)
                } else {
                    failure_entry(command, target.clone(), &err)
                };
                record(ctx, entry);
            }
            tracing::debug!(command, code = err.code.as_u16(), "request failed");
            ResponseEnvelope::error(req.id.clone(), &err)
        }
    };
    response.with_latency(elapsed_ms(started))
}

async fn run_handler(ctx: &RuntimeContext, req: &RequestEnvelope) -> HandlerResult {
    match req.command {
        Command::Whoami => handlers::whoami::handle(ctx, req),
        Command::Validate => handlers::validate::handle(ctx, req),
        Command::Index => handlers::index::handle(ctx, req).await,
        Command::Search => handlers::search::handle(ctx, req).await,
        Command::Plan => handlers::plan::handle(ctx, req).await,
        Command::Diff => handlers::diff::handle(ctx, req).await,
        Command::Apply => handlers::apply::handle(ctx, req),
        Command::Test => handlers::test::handle(ctx, req).await,
        Command::Log => handlers::log::handle(ctx, req),
        Command::Undo => handlers::undo::handle(ctx, req),
        Command::Unknown => Err(NexxonError::new(
            ErrorCode::UnknownCommand,
            "Unknown command: unknown",
        )),
    }
}

fn rule_of(err: &NexxonError) -> Option<String> {
    err.details
        .as_ref()
        .and_then(|d| d.get("rule"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn audit_target(ctx: &RuntimeContext, req: &RequestEnvelope) -> Option<String> {
    match req.command {
        Command::Test => Some(
            req.arg_str("cmd")
                .unwrap_or(&ctx.config.test_command)
                .to_string(),
        ),
        Command::Search => req.arg_str("q").map(str::to_string),
        _ => req.arg_str("file").map(|f| ctx.relative_path(f)),
    }
}

fn target_op(command: Command) -> Option<String> {
    let op = match command {
        Command::Apply | Command::Undo => "write",
        Command::Diff | Command::Search | Command::Index => "read",
        Command::Test => "exec",
        _ => return None,
    };
    Some(op.to_string())
}

fn denial_entry(command: &str, target: Option<String>, denial: &Denial) -> AuditEntry {
    AuditEntry::new(Actor::User, command)
        .with_target(target, None)
        .with_policy(denial.decision, denial.rule.clone())
        .with_result(ResultStatus::Error, Some(denial.error.message.clone()))
}

fn failure_entry(command: &str, target: Option<String>, err: &NexxonError) -> AuditEntry {
    AuditEntry::new(Actor::User, command)
        .with_target(target, None)
        .with_result(
            ResultStatus::Error,
            Some(format!("{} {}", err.code.as_u16(), err.message)),
        )
}

/// Append an entry after the request was admitted. Failures are logged only.
fn record(ctx: &RuntimeContext, entry: AuditEntry) {
    if let Err(e) = ctx.audit(&entry) {
        tracing::error!(error = %e, action = %entry.action, "audit append failed");
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
