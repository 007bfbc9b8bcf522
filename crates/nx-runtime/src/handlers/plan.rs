// plan.rs - Ask the provider for a step-by-step plan.
//
// Provider failures and unparseable completions do not fail the request:
// the caller gets a generic plan plus a `provider_error` describing what
// went wrong, so the agent loop can keep going.

use serde_json::{json, Value};

use nx_protocol::{NexxonError, RequestEnvelope};
use nx_provider::CompletionOptions;

use super::HandlerResult;
use crate::context::RuntimeContext;
use crate::error::IntoNexxonError;
use crate::gate::requested_tokens;
use crate::prompts::{build_context, extract_json, plan_prompt};

/// Semantic matches pulled into the planning context.
const CONTEXT_MATCHES: usize = 5;

fn fallback_steps() -> Value {
    json!([
        "Analyze the task requirements",
        "Identify the files that need to change",
        "Implement the changes in small steps",
        "Add or update tests",
        "Run the test suite and verify"
    ])
}

fn error_summary(err: &NexxonError) -> Value {
    json!({ "code": err.code.as_u16(), "message": err.message, "retryable": err.is_retryable() })
}

pub async fn handle(ctx: &RuntimeContext, req: &RequestEnvelope) -> HandlerResult {
    let task = req.require_str("task")?;
    let provider = ctx.provider_for(req.arg_str("model"))?;

    let matches = ctx
        .vectors
        .search(task, CONTEXT_MATCHES)
        .await
        .unwrap_or_default();
    let history = ctx.ledger.last_apply_records(3).unwrap_or_default();
    let prompt = plan_prompt(task, &build_context(task, &matches, &history));

    let options = CompletionOptions::default().with_max_tokens(requested_tokens(req));
    let completion = ctx
        .registry
        .complete(provider.name(), &prompt, &options)
        .await;

    let text = match completion {
        Ok(text) => text,
        Err(e) => {
            let err = e.into_nexxon();
            tracing::warn!(provider = provider.name(), error = %err.message, "plan fell back");
            return Ok(json!({
                "task": task,
                "plan_steps": fallback_steps(),
                "files_to_modify": [],
                "confidence": "low",
                "provider": provider.name(),
                "provider_error": error_summary(&err),
            }));
        }
    };

    match extract_json(&text).filter(|v| v.get("plan_steps").is_some_and(Value::is_array)) {
        Some(plan) => Ok(json!({
            "task": task,
            "plan_steps": plan["plan_steps"],
            "files_to_modify": plan.get("files_to_modify").cloned().unwrap_or_else(|| json!([])),
            "confidence": plan.get("confidence").cloned().unwrap_or_else(|| json!("medium")),
            "provider": provider.name(),
        })),
        None => {
            tracing::warn!(provider = provider.name(), "plan completion was not valid JSON");
            Ok(json!({
                "task": task,
                "plan_steps": fallback_steps(),
                "files_to_modify": [],
                "confidence": "low",
                "provider": provider.name(),
                "raw": text,
            }))
        }
    }
}
