// search.rs - Text search over visible files, with optional semantic search.

use serde::Serialize;
use serde_json::json;

use nx_protocol::{ErrorCode, NexxonError, RequestEnvelope};

use super::index::visible_files;
use super::HandlerResult;
use crate::context::RuntimeContext;

const MAX_FILES: usize = 2000;
const MAX_MATCHES: usize = 50;
const CONTEXT_CHARS: usize = 80;
const SEMANTIC_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TextMatch {
    pub file: String,
    pub line: usize,
    pub text: String,
}

pub async fn handle(ctx: &RuntimeContext, req: &RequestEnvelope) -> HandlerResult {
    let query = req.require_str("q")?;

    if req.arg_bool("semantic") {
        match ctx.vectors.search(query, SEMANTIC_LIMIT).await {
            Ok(found) => {
                let matches: Vec<_> = found
                    .into_iter()
                    .map(|m| json!({ "file": m.file, "text": m.chunk, "relevance": m.score }))
                    .collect();
                return Ok(json!({ "query": query, "mode": "semantic", "matches": matches }));
            }
            Err(e) => {
                tracing::warn!(error = %e, "semantic search unavailable, falling back to text");
                let (matches, searched) = text_search(ctx, query)?;
                return Ok(json!({
                    "query": query,
                    "mode": "text",
                    "matches": matches,
                    "files_searched": searched,
                    "note": "semantic unavailable; used text fallback",
                }));
            }
        }
    }

    let (matches, searched) = text_search(ctx, query)?;
    Ok(json!({
        "query": query,
        "mode": "text",
        "matches": matches,
        "files_searched": searched,
    }))
}

/// Case-insensitive line search. Every file read is charged to the read
/// limit; unreadable or non-UTF-8 files are skipped.
fn text_search(
    ctx: &RuntimeContext,
    query: &str,
) -> Result<(Vec<TextMatch>, usize), NexxonError> {
    let needle = query.to_lowercase();
    let mut matches = Vec::new();
    let mut searched = 0;

    for file in visible_files(ctx)?.into_iter().take(MAX_FILES) {
        let path = ctx.resolve(&file);
        if let Some(enforcer) = &ctx.enforcer {
            let bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            let verdict = enforcer.check_file_read_limit(bytes);
            if !verdict.allowed {
                return Err(NexxonError::new(
                    ErrorCode::PolicyLimitExceeded,
                    verdict
                        .reason
                        .unwrap_or_else(|| "File read limit exceeded".to_string()),
                )
                .with_details(json!({ "subject": file, "rule": verdict.rule })));
            }
        }
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        searched += 1;

        for (n, line) in content.lines().enumerate() {
            if line.to_lowercase().contains(&needle) {
                matches.push(TextMatch {
                    file: file.clone(),
                    line: n + 1,
                    text: excerpt(line, &needle),
                });
                if matches.len() >= MAX_MATCHES {
                    return Ok((matches, searched));
                }
            }
        }
    }
    Ok((matches, searched))
}

/// Up to `CONTEXT_CHARS` characters of `line`, centred on the match.
fn excerpt(line: &str, needle: &str) -> String {
    let line = line.trim();
    let chars: Vec<char> = line.chars().collect();
    if chars.len() <= CONTEXT_CHARS {
        return line.to_string();
    }
    let lowered: Vec<char> = line.to_lowercase().chars().collect();
    let needle: Vec<char> = needle.chars().collect();
    let hit = lowered
        .windows(needle.len().max(1))
        .position(|w| w == needle.as_slice())
        .unwrap_or(0)
        .min(chars.len());
    let half = CONTEXT_CHARS.saturating_sub(needle.len()) / 2;
    let start = hit.saturating_sub(half).min(chars.len() - CONTEXT_CHARS);
    chars[start..start + CONTEXT_CHARS].iter().collect()
}
