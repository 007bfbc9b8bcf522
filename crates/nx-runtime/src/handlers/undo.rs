// undo.rs - Revert the most recent applies.

use serde_json::json;

use nx_protocol::RequestEnvelope;

use super::HandlerResult;
use crate::context::RuntimeContext;
use crate::error::IntoNexxonError;

pub fn handle(ctx: &RuntimeContext, req: &RequestEnvelope) -> HandlerResult {
    let steps = req.arg_u64("steps").unwrap_or(1).max(1) as usize;
    let records = ctx
        .ledger
        .last_apply_records(steps)
        .map_err(IntoNexxonError::into_nexxon)?;

    if records.is_empty() {
        return Ok(json!({ "reverted": false, "message": "No apply records to undo" }));
    }

    let outcome = ctx.undo.undo(&records);
    tracing::info!(
        requested = steps,
        reverted = outcome.steps,
        method = %outcome.method,
        conflicts = outcome.conflicts.len(),
        "undo finished"
    );
    Ok(json!({
        "reverted": outcome.reverted,
        "steps": outcome.steps,
        "method": outcome.method,
        "conflicts": outcome.conflicts,
        "records": records.iter().map(|r| &r.id).collect::<Vec<_>>(),
    }))
}
