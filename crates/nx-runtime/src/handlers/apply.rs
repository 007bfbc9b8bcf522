// apply.rs - Write one file and record it in the ledger.
//
// Order matters for undo: the prior content is snapshotted first, then
// the file is written, then the apply record is committed. A dry run does
// none of the three and only previews the patch.

use std::fs;

use serde_json::json;

use nx_ledger::NewApply;
use nx_protocol::{NexxonError, RequestEnvelope};

use super::{require_all, HandlerResult};
use crate::context::RuntimeContext;
use crate::error::{IntoNexxonError, RuntimeError};

pub fn handle(ctx: &RuntimeContext, req: &RequestEnvelope) -> HandlerResult {
    let args = require_all(req, &["file", "content"])?;
    let (file, content) = (ctx.relative_path(args[0]), args[1]);
    let path = ctx.resolve(&file);
    let existed = path.is_file();

    if req.arg_bool("dry_run") {
        let current = if existed {
            fs::read_to_string(&path).unwrap_or_default()
        } else {
            String::new()
        };
        return Ok(json!({
            "applied": false,
            "dry_run": true,
            "file": file,
            "had_backup": existed,
            "patch": ctx.diff.unified_diff(&file, &file, &current, content),
        }));
    }

    let (_, manifest_path) = ctx
        .snapshots
        .capture(ctx.project_root(), std::slice::from_ref(&file))
        .map_err(IntoNexxonError::into_nexxon)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| NexxonError::from(RuntimeError::io(parent, e)))?;
    }
    fs::write(&path, content).map_err(|e| NexxonError::from(RuntimeError::io(&path, e)))?;

    let backup_path = manifest_path.display().to_string();
    let mut apply = NewApply::new(vec![file.clone()]).with_backup(&backup_path);
    if let Some(rev) = ctx.undo.head_revision() {
        apply = apply.with_source_revision(rev);
    }
    let record = ctx
        .ledger
        .record_apply(apply)
        .map_err(IntoNexxonError::into_nexxon)?;
    tracing::info!(file = %file, record = %record.id, "apply committed");

    Ok(json!({
        "applied": true,
        "file": file,
        "had_backup": existed,
        "backup_path": backup_path,
        "record_id": record.id,
        "session_id": record.session_id,
    }))
}
