// handlers/mod.rs - One handler per envelope command.
//
// Handlers run after the policy gate has passed. Each takes the shared
// context and the request and returns the `result` payload, or a
// `NexxonError` that dispatch turns into an error envelope.

pub mod apply;
pub mod diff;
pub mod index;
pub mod log;
pub mod plan;
pub mod search;
pub mod undo;
pub mod validate;
pub mod whoami;

use serde_json::{json, Value};

use nx_protocol::{NexxonError, RequestEnvelope};

pub type HandlerResult = Result<Value, NexxonError>;

/// All required string arguments, reporting every missing key at once.
pub(crate) fn require_all<'a>(
    req: &'a RequestEnvelope,
    keys: &[&str],
) -> Result<Vec<&'a str>, NexxonError> {
    let missing: Vec<&str> = keys
        .iter()
        .copied()
        .filter(|k| req.arg_str(k).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(NexxonError::invalid_args(format!(
            "missing required argument(s): {}",
            missing.join(", ")
        ))
        .with_context(req.command.as_str(), req.args.clone())
        .with_details(json!({ "missing": missing })));
    }
    Ok(keys.iter().filter_map(|k| req.arg_str(k)).collect())
}

/// The last `max` characters of `text`.
pub(crate) fn tail_chars(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    text.chars().skip(count - max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nx_protocol::{Command, ErrorCode};

    #[test]
    fn require_all_lists_every_missing_key() {
        let req = RequestEnvelope::new(Command::Diff).with_arg("task", "t");
        let err = require_all(&req, &["file", "task", "model"]).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArgs);
        assert_eq!(err.details.unwrap()["missing"], json!(["file", "model"]));

        let req = req.with_arg("file", "a.rs").with_arg("model", "mock");
        assert_eq!(
            require_all(&req, &["file", "task"]).unwrap(),
            vec!["a.rs", "t"]
        );
    }

    #[test]
    fn tail_keeps_last_characters() {
        assert_eq!(tail_chars("abcdef", 3), "def");
        assert_eq!(tail_chars("ab", 3), "ab");
        assert_eq!(tail_chars("ééé", 2), "éé");
    }
}
