// validate.rs - Check a session override and report the resulting hash.
//
// Stateless: the override is merged over the project policy for this
// request only and nothing in the context changes.

use serde_json::json;

use nx_policy::merge_fragments;
use nx_protocol::{ErrorCode, NexxonError, RequestEnvelope};

use super::HandlerResult;
use crate::context::{RuntimeContext, NO_POLICY_HASH};

pub fn handle(ctx: &RuntimeContext, req: &RequestEnvelope) -> HandlerResult {
    let Some(project) = &ctx.project_policy else {
        return Ok(json!({
            "valid": true,
            "policy_trace": { "effective_hash": NO_POLICY_HASH, "decisions": [] },
        }));
    };

    let directive = req.policy.clone().unwrap_or_default();
    let overrides = directive.overrides.as_ref();

    if let Some(fragment) = overrides {
        let validation = ctx
            .hierarchy
            .validate_override(fragment, directive.override_mode);
        if !validation.valid {
            tracing::debug!(
                mode = %directive.override_mode,
                violations = validation.violations.len(),
                "override rejected"
            );
            return Err(NexxonError::new(
                ErrorCode::PolicyInvalidOverride,
                format!(
                    "Policy validation failed: {}",
                    validation.violations.join("; ")
                ),
            )
            .with_context(req.command.as_str(), req.args.clone())
            .with_details(json!({
                "violations": validation.violations,
                "override_mode": directive.override_mode,
            })));
        }
    }

    let merged = merge_fragments(None, Some(project), overrides);
    Ok(json!({
        "valid": true,
        "override_mode": directive.override_mode,
        "override_reason": directive.override_reason,
        "policy_trace": { "effective_hash": merged.hash, "decisions": [] },
    }))
}
