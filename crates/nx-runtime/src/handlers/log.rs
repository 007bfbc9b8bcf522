// log.rs - Tail the audit log.

use serde_json::json;

use nx_audit::AuditLog;
use nx_protocol::RequestEnvelope;

use super::HandlerResult;
use crate::context::RuntimeContext;
use crate::error::IntoNexxonError;

const DEFAULT_LIMIT: u64 = 50;
/// Larger requests are clamped to this many entries.
pub const MAX_LIMIT: u64 = 1000;

pub fn handle(ctx: &RuntimeContext, req: &RequestEnvelope) -> HandlerResult {
    let limit = req.arg_u64("limit").unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT) as usize;
    let entries = if ctx.config.audit_log.exists() {
        AuditLog::tail(&ctx.config.audit_log, limit).map_err(IntoNexxonError::into_nexxon)?
    } else {
        Vec::new()
    };
    Ok(json!({ "entries": entries }))
}
