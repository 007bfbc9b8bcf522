// snapshot.rs - Content-addressed storage for the prior state of applied files.
//
// Layout under the store root (`.nexxon/snapshots/`):
//
//   objects/<sha256>              file content, named by its own hash
//   <timestamp>-<id>.json         one manifest per apply
//
// Identical content is stored once no matter how many applies touch it.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use nx_audit::hasher::hash_bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;

/// Prior state of every file touched by one apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Relative path → blob hash. `None` means the file did not exist.
    pub files: BTreeMap<String, Option<String>>,
}

impl SnapshotManifest {
    /// Number of files that had content before the apply.
    pub fn existing_files(&self) -> usize {
        self.files.values().filter(|h| h.is_some()).count()
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn objects_dir(&self) -> PathBuf {
        self.root.join("objects")
    }

    /// Record the current content of `files` (relative to `project_root`)
    /// and write a manifest. Returns the manifest and its path.
    pub fn capture(
        &self,
        project_root: &Path,
        files: &[String],
    ) -> Result<(SnapshotManifest, PathBuf), LedgerError> {
        let mut entries = BTreeMap::new();
        for file in files {
            let full = project_root.join(file);
            let hash = if full.is_file() {
                let content = fs::read(&full).map_err(|e| LedgerError::io(&full, e))?;
                Some(self.store_blob(&content)?)
            } else {
                None
            };
            entries.insert(file.clone(), hash);
        }

        let manifest = SnapshotManifest {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            files: entries,
        };
        let path = self.root.join(format!(
            "{}-{}.json",
            manifest.created_at.format("%Y%m%dT%H%M%S%.3fZ"),
            manifest.id
        ));
        fs::create_dir_all(&self.root).map_err(|e| LedgerError::io(&self.root, e))?;
        let json = serde_json::to_string_pretty(&manifest)?;
        fs::write(&path, json).map_err(|e| LedgerError::io(&path, e))?;
        tracing::debug!(manifest = %path.display(), files = files.len(), "snapshot captured");
        Ok((manifest, path))
    }

    /// Write `content` under its hash; a blob that already exists is reused.
    pub fn store_blob(&self, content: &[u8]) -> Result<String, LedgerError> {
        let hash = hash_bytes(content);
        let dir = self.objects_dir();
        let path = dir.join(&hash);
        if !path.exists() {
            fs::create_dir_all(&dir).map_err(|e| LedgerError::io(&dir, e))?;
            fs::write(&path, content).map_err(|e| LedgerError::io(&path, e))?;
        }
        Ok(hash)
    }

    /// Read a blob back, verifying it still hashes to its name.
    pub fn read_blob(&self, hash: &str) -> Result<Vec<u8>, LedgerError> {
        let path = self.objects_dir().join(hash);
        if !path.is_file() {
            return Err(LedgerError::SnapshotNotFound(path.display().to_string()));
        }
        let content = fs::read(&path).map_err(|e| LedgerError::io(&path, e))?;
        let actual = hash_bytes(&content);
        if actual != hash {
            return Err(LedgerError::BlobCorrupt {
                hash: hash.to_string(),
                actual,
            });
        }
        Ok(content)
    }

    pub fn load_manifest(&self, path: impl AsRef<Path>) -> Result<SnapshotManifest, LedgerError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(LedgerError::SnapshotNotFound(path.display().to_string()));
        }
        let json = fs::read_to_string(path).map_err(|e| LedgerError::io(path, e))?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn capture_records_existing_and_missing_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        let store = SnapshotStore::new(dir.path().join("snapshots"));

        let (manifest, path) = store
            .capture(dir.path(), &["a.txt".into(), "new.txt".into()])
            .unwrap();
        assert!(path.is_file());
        assert_eq!(manifest.existing_files(), 1);
        assert!(manifest.files["new.txt"].is_none());

        let hash = manifest.files["a.txt"].clone().unwrap();
        assert_eq!(store.read_blob(&hash).unwrap(), b"alpha");
        assert_eq!(store.load_manifest(&path).unwrap(), manifest);
    }

    #[test]
    fn identical_content_shares_one_blob() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let a = store.store_blob(b"same").unwrap();
        let b = store.store_blob(b"same").unwrap();
        assert_eq!(a, b);
        assert_eq!(fs::read_dir(dir.path().join("objects")).unwrap().count(), 1);
    }

    #[test]
    fn tampered_blob_is_rejected() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let hash = store.store_blob(b"original").unwrap();
        fs::write(dir.path().join("objects").join(&hash), b"changed").unwrap();
        assert!(matches!(
            store.read_blob(&hash),
            Err(LedgerError::BlobCorrupt { .. })
        ));
    }

    #[test]
    fn missing_manifest_is_not_found() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        assert!(matches!(
            store.load_manifest(dir.path().join("gone.json")),
            Err(LedgerError::SnapshotNotFound(_))
        ));
    }
}
