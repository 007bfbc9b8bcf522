// index.rs - List the project files the policy lets the agent see.

use serde_json::json;

use nx_protocol::{NexxonError, RequestEnvelope};

use super::HandlerResult;
use crate::context::RuntimeContext;

/// Files echoed back in the response.
const LISTED_FILES: usize = 100;

const SOURCE_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "js", "jsx", "py", "java", "go", "rs", "cpp", "c", "h",
];

pub(crate) fn is_source_file(path: &str) -> bool {
    path.rsplit_once('.')
        .is_some_and(|(_, ext)| SOURCE_EXTENSIONS.contains(&ext))
}

/// Scanned files filtered through the fs policy.
pub(crate) fn visible_files(ctx: &RuntimeContext) -> Result<Vec<String>, NexxonError> {
    let files = ctx.scanner.scan(ctx.project_root())?;
    Ok(match &ctx.enforcer {
        Some(enforcer) => files
            .into_iter()
            .filter(|f| enforcer.check_fs_access(f).allowed)
            .collect(),
        None => files,
    })
}

pub async fn handle(ctx: &RuntimeContext, req: &RequestEnvelope) -> HandlerResult {
    let files = visible_files(ctx)?;
    tracing::info!(files = files.len(), "project indexed");

    let mut result = json!({
        "indexed_files": files.len(),
        "files": files.iter().take(LISTED_FILES).collect::<Vec<_>>(),
    });

    if req.arg_bool("vectors") {
        let sources: Vec<String> = files.into_iter().filter(|f| is_source_file(f)).collect();
        result["vectors"] = match ctx.vectors.index_files(ctx.project_root(), &sources).await {
            Ok(stats) => json!(stats),
            Err(e) => {
                tracing::warn!(error = %e, "vector indexing skipped");
                json!({ "error": e.to_string() })
            }
        };
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_extensions() {
        assert!(is_source_file("src/lib.rs"));
        assert!(is_source_file("web/app.tsx"));
        assert!(!is_source_file("README.md"));
        assert!(!is_source_file("Makefile"));
    }
}
