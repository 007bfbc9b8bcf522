// context.rs - RuntimeContext: every collaborator a handler needs.
//
// Built once at startup and shared as `Arc<RuntimeContext>`. Mutable state
// lives behind each component's own lock (enforcer counters, breakers,
// ledger connection, audit writer), and no lock is held across an await.

use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use nx_audit::{AuditEntry, AuditError, AuditLog, Redactor};
use nx_ledger::{SessionLedger, SnapshotStore, UndoManager};
use nx_policy::{PolicyDocument, PolicyEnforcer, PolicyFragment, PolicyHierarchy};
use nx_protocol::NexxonError;
use nx_provider::{LlmProvider, ProviderRegistry};

use crate::collaborators::{
    DiffProducer, FileScanner, GitignoreScanner, NoVectorSearch, UnifiedDiffProducer, VectorSearch,
};
use crate::config::RuntimeConfig;
use crate::error::{IntoNexxonError, RuntimeError};

/// Hash reported when no policy is loaded.
pub const NO_POLICY_HASH: &str = "sha256:none";

pub struct RuntimeContext {
    pub config: RuntimeConfig,
    /// `None` in permissive mode (no policy document).
    pub enforcer: Option<PolicyEnforcer>,
    /// The project policy as a fragment, the base for override validation.
    pub project_policy: Option<PolicyFragment>,
    pub hierarchy: PolicyHierarchy,
    pub registry: ProviderRegistry,
    pub ledger: SessionLedger,
    pub snapshots: SnapshotStore,
    pub undo: UndoManager,
    pub diff: Arc<dyn DiffProducer>,
    pub scanner: Arc<dyn FileScanner>,
    pub vectors: Arc<dyn VectorSearch>,
    audit: Mutex<AuditLog>,
}

impl RuntimeContext {
    /// Load policy, open the audit log and ledger, and resolve providers.
    ///
    /// A missing `policy.yaml` puts the runtime in permissive mode; a
    /// present but invalid one is an error.
    pub fn open(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        let document = if config.policy_path.is_file() {
            Some(PolicyDocument::load(&config.policy_path)?)
        } else {
            tracing::warn!(
                path = %config.policy_path.display(),
                "policy not found, running in permissive mode"
            );
            None
        };

        let mut registry = ProviderRegistry::from_specs(&config.providers, config.breaker);
        if let Some(name) = &config.default_provider {
            if let Err(e) = registry.set_default(name) {
                tracing::warn!(error = %e, "configured default provider ignored");
            }
        }

        let ledger = SessionLedger::open(&config.ledger_db)?;
        Self::assemble(config, document, registry, ledger)
    }

    /// Build a context from already-constructed parts. Used by `open` and tests.
    pub fn assemble(
        config: RuntimeConfig,
        document: Option<PolicyDocument>,
        registry: ProviderRegistry,
        ledger: SessionLedger,
    ) -> Result<Self, RuntimeError> {
        let redactor = match &document {
            Some(doc) => Redactor::new(&doc.redaction.patterns)?,
            None => Redactor::none(),
        };
        let audit = AuditLog::open(&config.audit_log)?.with_redactor(redactor);

        let project_policy = document.as_ref().map(PolicyDocument::to_fragment);
        let hierarchy = match &project_policy {
            Some(fragment) => PolicyHierarchy::with_effective(fragment.clone()),
            None => PolicyHierarchy::new(),
        };
        let enforcer = document.map(PolicyEnforcer::new).transpose()?;
        if let Some(enforcer) = &enforcer {
            tracing::info!(hash = %enforcer.effective_hash(), "policy loaded");
        }

        let snapshots = SnapshotStore::new(&config.snapshots_dir);
        let undo = UndoManager::new(&config.project_root, snapshots.clone());

        Ok(Self {
            enforcer,
            project_policy,
            hierarchy,
            registry,
            ledger,
            snapshots,
            undo,
            diff: Arc::new(UnifiedDiffProducer),
            scanner: Arc::new(GitignoreScanner),
            vectors: Arc::new(NoVectorSearch),
            audit: Mutex::new(audit),
            config,
        })
    }

    pub fn with_diff_producer(mut self, diff: Arc<dyn DiffProducer>) -> Self {
        self.diff = diff;
        self
    }

    pub fn with_scanner(mut self, scanner: Arc<dyn FileScanner>) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn with_vector_search(mut self, vectors: Arc<dyn VectorSearch>) -> Self {
        self.vectors = vectors;
        self
    }

    /// Start the process session and apply ledger retention.
    pub fn start(&self) -> Result<String, RuntimeError> {
        let removed = self.ledger.cleanup(self.config.retention_days)?;
        if removed > 0 {
            tracing::info!(removed, "expired sessions removed");
        }
        let session = self.ledger.start_session(Some("local"))?;
        Ok(session.id)
    }

    /// End the current session. Called on graceful shutdown.
    pub fn shutdown(&self) -> Result<(), RuntimeError> {
        let session = self.ledger.current_session()?;
        self.ledger.end_session(&session.id)?;
        Ok(())
    }

    pub fn project_root(&self) -> &Path {
        &self.config.project_root
    }

    pub fn effective_hash(&self) -> String {
        self.enforcer
            .as_ref()
            .map(PolicyEnforcer::effective_hash)
            .unwrap_or_else(|| NO_POLICY_HASH.to_string())
    }

    /// Redact and append one audit entry.
    pub fn audit(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let mut log = self.audit.lock().unwrap_or_else(|e| e.into_inner());
        log.append(entry)?;
        Ok(())
    }

    /// The provider a request names via `args.model`, or the default.
    pub fn provider_for(&self, name: Option<&str>) -> Result<Arc<dyn LlmProvider>, NexxonError> {
        match name {
            Some(name) => self.registry.get_provider(name),
            None => self.registry.get_default(),
        }
        .map_err(IntoNexxonError::into_nexxon)
    }

    /// Turn a path argument into a project-relative, `/`-separated path.
    ///
    /// Absolute paths inside the project are made relative; anything else
    /// is returned as given so the policy check can reject it.
    pub fn relative_path(&self, raw: &str) -> String {
        relative_to(&self.config.project_root, raw)
    }

    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.config.project_root.join(relative)
    }
}

pub(crate) fn relative_to(root: &Path, raw: &str) -> String {
    let normalized = raw.replace('\\', "/");
    let path = Path::new(&normalized);
    if path.is_absolute() {
        if let Ok(rel) = path.strip_prefix(root) {
            return rel
                .components()
                .filter_map(|c| match c {
                    Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("/");
        }
    }
    normalized
        .strip_prefix("./")
        .map(str::to_string)
        .unwrap_or(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_are_normalized() {
        let root = Path::new("/work/app");
        assert_eq!(relative_to(root, "/work/app/src/lib.rs"), "src/lib.rs");
        assert_eq!(relative_to(root, "./src/lib.rs"), "src/lib.rs");
        assert_eq!(relative_to(root, "src\\main.rs"), "src/main.rs");
        assert_eq!(relative_to(root, "/etc/passwd"), "/etc/passwd");
        assert_eq!(relative_to(root, "../secret"), "../secret");
    }
}
