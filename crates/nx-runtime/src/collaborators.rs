// collaborators.rs - Capabilities the runtime consumes but does not own.
//
// Diff generation, project file scanning, and vector search sit behind
// traits so the dispatch core only sees capabilities. The defaults here
// are what the daemon wires up; tests substitute their own.

use std::path::Path;

use async_trait::async_trait;
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use similar::TextDiff;
use thiserror::Error;

use crate::error::RuntimeError;

/// Produces unified diff text.
pub trait DiffProducer: Send + Sync {
    fn unified_diff(&self, old_path: &str, new_path: &str, old: &str, new: &str) -> String;
}

/// Lists project files, relative to the project root, with `/` separators.
pub trait FileScanner: Send + Sync {
    fn scan(&self, root: &Path) -> Result<Vec<String>, RuntimeError>;
}

/// One ranked semantic match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    pub file: String,
    pub chunk: String,
    pub score: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorStats {
    pub files_indexed: usize,
    pub chunks: usize,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VectorError {
    #[error("semantic search is not configured")]
    Unavailable,
    #[error("vector search failed: {0}")]
    Failed(String),
}

/// Embedding index over project files.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn index_files(&self, root: &Path, files: &[String]) -> Result<VectorStats, VectorError>;
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<VectorMatch>, VectorError>;
}

/// Line-based unified diffs with three lines of context.
#[derive(Debug, Clone, Default)]
pub struct UnifiedDiffProducer;

impl DiffProducer for UnifiedDiffProducer {
    fn unified_diff(&self, old_path: &str, new_path: &str, old: &str, new: &str) -> String {
        TextDiff::from_lines(old, new)
            .unified_diff()
            .context_radius(3)
            .header(&format!("a/{}", old_path), &format!("b/{}", new_path))
            .to_string()
    }
}

/// Walks the project honoring `.gitignore`, `.ignore`, and hidden-file rules.
#[derive(Debug, Clone, Default)]
pub struct GitignoreScanner;

impl FileScanner for GitignoreScanner {
    fn scan(&self, root: &Path) -> Result<Vec<String>, RuntimeError> {
        let walker = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .require_git(false)
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| RuntimeError::Scan(e.to_string()))?;
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(root) {
                files.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Semantic search that is never available; callers fall back to text.
#[derive(Debug, Clone, Default)]
pub struct NoVectorSearch;

#[async_trait]
impl VectorSearch for NoVectorSearch {
    async fn index_files(&self, _root: &Path, _files: &[String]) -> Result<VectorStats, VectorError> {
        Err(VectorError::Unavailable)
    }

    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<VectorMatch>, VectorError> {
        Err(VectorError::Unavailable)
    }
}
