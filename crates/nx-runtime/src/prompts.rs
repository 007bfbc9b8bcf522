// prompts.rs - Prompt templates and the planning context window.

use nx_ledger::ApplyRecord;
use serde_json::Value;

use crate::collaborators::VectorMatch;

/// Rough token budget for the planning context.
pub const CONTEXT_MAX_TOKENS: usize = 8000;

/// Recent applies included in the planning context.
const HISTORY_WINDOW: usize = 3;

pub fn plan_prompt(task: &str, context: &str) -> String {
    format!(
        r#"You are an expert software engineer helping with code planning.

TASK: {task}

CODE CONTEXT:
{context}

Generate a step-by-step plan to accomplish this task. Be specific and actionable.

Return your response as JSON in this exact format:
{{
  "plan_steps": [
    "Step 1: Description of first step",
    "Step 2: Description of second step"
  ],
  "files_to_modify": ["path/to/file1.rs", "path/to/file2.rs"],
  "confidence": "high|medium|low"
}}

Only respond with valid JSON, no additional text."#
    )
}

pub fn code_prompt(task: &str, file: &str, current: &str) -> String {
    format!(
        r#"You are an expert software engineer helping with code generation.

TASK: {task}

FILE: {file}

CURRENT CONTENT:
```
{current}
```

Generate the COMPLETE updated file content to accomplish the task.
Include ALL existing code that should remain unchanged.
Make only the necessary modifications.

Return ONLY the complete file content, no explanations, no markdown code blocks."#
    )
}

/// About four characters per token.
fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Assemble the task, semantic matches, and recent applies into a context
/// string. Matches may use half the budget; history fills up to 80%.
///
/// `history` is newest first, as the ledger returns it.
pub fn build_context(task: &str, matches: &[VectorMatch], history: &[ApplyRecord]) -> String {
    let mut parts = vec![format!("Task: {}\n", task)];
    let mut tokens = estimate_tokens(task);

    if !matches.is_empty() {
        parts.push("\nRelevant Code:\n".to_string());
        for m in matches {
            let chunk = format!("File: {}\n{}\n", m.file, m.chunk);
            let cost = estimate_tokens(&chunk);
            if tokens + cost < CONTEXT_MAX_TOKENS / 2 {
                parts.push(chunk);
                tokens += cost;
            }
        }
    }

    let recent: Vec<&ApplyRecord> = history.iter().take(HISTORY_WINDOW).rev().collect();
    if !recent.is_empty() {
        parts.push("\nRecent Changes:\n".to_string());
        for record in recent {
            let entry = format!(
                "{}: Modified {}\n",
                record.ts.to_rfc3339(),
                record.files_changed.join(", ")
            );
            let cost = estimate_tokens(&entry);
            if tokens + cost < CONTEXT_MAX_TOKENS * 4 / 5 {
                parts.push(entry);
                tokens += cost;
            }
        }
    }

    parts.join("\n")
}

/// Pull a JSON object out of a completion: a ```json fence, then any
/// ``` fence, then the whole text.
pub fn extract_json(text: &str) -> Option<Value> {
    let candidates = [fenced(text, "```json"), fenced(text, "```"), Some(text.trim())];
    candidates
        .into_iter()
        .flatten()
        .find_map(|c| serde_json::from_str::<Value>(c).ok())
}

fn fenced<'a>(text: &'a str, open: &str) -> Option<&'a str> {
    let start = text.find(open)? + open.len();
    let rest = &text[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(file: &str) -> ApplyRecord {
        ApplyRecord {
            id: file.to_string(),
            session_id: "s".into(),
            ts: Utc::now(),
            files_changed: vec![file.to_string()],
            backup_path: None,
            patch_path: None,
            source_revision: None,
        }
    }

    #[test]
    fn plan_prompt_carries_task_and_marker() {
        let prompt = plan_prompt("add caching", "Task: add caching");
        assert!(prompt.contains("TASK: add caching"));
        assert!(prompt
            .to_lowercase()
            .contains("generate a step-by-step plan"));
        assert!(prompt.contains("\"plan_steps\""));
    }

    #[test]
    fn code_prompt_embeds_current_content() {
        let prompt = code_prompt("rename", "src/a.rs", "fn a() {}");
        assert!(prompt.contains("FILE: src/a.rs"));
        assert!(prompt.contains("fn a() {}"));
    }

    #[test]
    fn context_keeps_last_three_applies_oldest_first() {
        let history: Vec<ApplyRecord> = ["d.rs", "c.rs", "b.rs", "a.rs"]
            .iter()
            .map(|f| record(f))
            .collect();
        let ctx = build_context("t", &[], &history);
        assert!(ctx.contains("Recent Changes"));
        assert!(!ctx.contains("a.rs"));
        let b = ctx.find("b.rs").unwrap();
        let d = ctx.find("d.rs").unwrap();
        assert!(b < d);
    }

    #[test]
    fn context_includes_semantic_matches() {
        let matches = vec![VectorMatch {
            file: "src/cache.rs".into(),
            chunk: "struct Cache;".into(),
            score: 0.9,
        }];
        let ctx = build_context("t", &matches, &[]);
        assert!(ctx.contains("File: src/cache.rs"));
        assert!(!ctx.contains("Recent Changes"));
    }

    #[test]
    fn extracts_json_from_fences_and_bare_text() {
        let fenced = "Here you go:\n```json\n{\"plan_steps\": [\"a\"]}\n```\n";
        assert_eq!(extract_json(fenced).unwrap()["plan_steps"][0], "a");

        let plain_fence = "```\n{\"x\": 1}\n```";
        assert_eq!(extract_json(plain_fence).unwrap()["x"], 1);

        assert_eq!(extract_json("  {\"y\": true} ").unwrap()["y"], true);
        assert!(extract_json("not json at all").is_none());
    }
}
