// whoami.rs - Caller identity and the active policy hash.

use serde_json::json;

use nx_protocol::RequestEnvelope;

use super::HandlerResult;
use crate::context::RuntimeContext;

/// Sample subjects reported when a caller asks for a policy trace.
const TRACE_SAMPLES: &[(&str, &str)] = &[
    ("exec", "npm install"),
    ("network", "registry.npmjs.org"),
];

pub fn handle(ctx: &RuntimeContext, req: &RequestEnvelope) -> HandlerResult {
    let claims = req.claims();
    let mut result = json!({
        "identity": claims,
        "policy_hash": ctx.effective_hash(),
        "session": ctx.ledger.current_session().ok().map(|s| s.id),
    });

    if req.arg_bool("policy_trace") {
        let decisions = ctx
            .enforcer
            .as_ref()
            .map(|e| e.decision_trace(TRACE_SAMPLES))
            .unwrap_or_default();
        result["policy_trace"] = json!({
            "effective_hash": ctx.effective_hash(),
            "decisions": decisions,
        });
    }
    Ok(result)
}
