// diff.rs - Propose new content for one file and return it as a patch.

use serde_json::json;

use nx_protocol::{NexxonError, RequestEnvelope};
use nx_provider::CompletionOptions;

use super::{require_all, HandlerResult};
use crate::context::RuntimeContext;
use crate::error::{IntoNexxonError, RuntimeError};
use crate::gate::requested_tokens;
use crate::prompts::code_prompt;

/// Normalize a completion into file content. Empty output means "no change".
fn proposed_content(completion: &str, current: &str) -> Option<String> {
    let mut body = completion.trim();
    if body.starts_with("```") {
        body = body
            .split_once('\n')
            .map(|(_, rest)| rest)
            .unwrap_or("")
            .trim_end()
            .trim_end_matches("```")
            .trim();
    }
    if body.is_empty() {
        return None;
    }
    let mut content = body.to_string();
    if current.ends_with('\n') {
        content.push('\n');
    }
    Some(content)
}

pub async fn handle(ctx: &RuntimeContext, req: &RequestEnvelope) -> HandlerResult {
    let args = require_all(req, &["file", "task"])?;
    let (file, task) = (ctx.relative_path(args[0]), args[1]);
    let provider = ctx.provider_for(req.arg_str("model"))?;

    let path = ctx.resolve(&file);
    let current = if path.is_file() {
        std::fs::read_to_string(&path).map_err(|e| NexxonError::from(RuntimeError::io(&path, e)))?
    } else {
        String::new()
    };

    let options = CompletionOptions::default().with_max_tokens(requested_tokens(req));
    let completion = ctx
        .registry
        .complete(provider.name(), &code_prompt(task, &file, &current), &options)
        .await;

    let (new_content, provider_error) = match completion {
        Ok(text) => (proposed_content(&text, &current), None),
        Err(e) => {
            let err = e.into_nexxon();
            tracing::warn!(provider = provider.name(), file = %file, error = %err.message, "diff left file unchanged");
            (None, Some(json!({ "code": err.code.as_u16(), "message": err.message })))
        }
    };
    let new_content = new_content.unwrap_or_else(|| current.clone());

    let patch = ctx.diff.unified_diff(&file, &file, &current, &new_content);
    let has_changes = patch.contains("@@");

    let mut result = json!({
        "file": file,
        "patch": patch,
        "has_changes": has_changes,
        "new_content": new_content,
        "provider": provider.name(),
    });
    if let Some(err) = provider_error {
        result["provider_error"] = err;
    }
    Ok(result)
}
