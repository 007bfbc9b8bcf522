// config.rs - Runtime configuration.
//
// RuntimeConfig determines where the runtime keeps its state (audit log,
// session ledger, snapshots) and which providers it talks to. The
// `for_project()` constructor generates the standard `.nexxon/` layout;
// `load()` overlays `.nexxon/config.toml` and the environment on top.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use nx_provider::{BreakerConfig, ProviderSpec};

use crate::error::RuntimeError;

pub const DEFAULT_PORT: u16 = 7777;
pub const PORT_ENV: &str = "NEXXON_PORT";

/// Configuration for one runtime process.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Root directory of the project; every path argument is relative to it.
    pub project_root: PathBuf,

    /// Project policy document. Absent means permissive mode.
    pub policy_path: PathBuf,

    /// Append-only, hash-chained audit log.
    pub audit_log: PathBuf,

    /// SQLite session/apply-record ledger.
    pub ledger_db: PathBuf,

    /// Content-addressed snapshot store for undo.
    pub snapshots_dir: PathBuf,

    /// Optional TOML overlay.
    pub config_file: PathBuf,

    pub port: u16,

    /// Ended sessions older than this are removed at startup.
    pub retention_days: u32,

    pub test_timeout_secs: u64,

    /// Command run by `test` when the request names none.
    pub test_command: String,

    pub providers: Vec<ProviderSpec>,

    /// Breaker tuning for providers that do not set their own.
    pub breaker: BreakerConfig,

    /// Provider used when a request does not name one.
    pub default_provider: Option<String>,
}

/// The on-disk shape of `.nexxon/config.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    port: Option<u16>,
    retention_days: Option<u32>,
    test_timeout_secs: Option<u64>,
    test_command: Option<String>,
    default_provider: Option<String>,
    providers: Vec<ProviderSpec>,
    breaker: Option<BreakerConfig>,
}

impl RuntimeConfig {
    /// Create a config with the standard `.nexxon/` layout for a project.
    pub fn for_project(project_root: impl AsRef<Path>) -> Self {
        let root = project_root.as_ref().to_path_buf();
        let nx_dir = root.join(".nexxon");
        Self {
            policy_path: root.join("policy.yaml"),
            audit_log: nx_dir.join("audit.log"),
            ledger_db: nx_dir.join("session.sqlite"),
            snapshots_dir: nx_dir.join("snapshots"),
            config_file: nx_dir.join("config.toml"),
            project_root: root,
            port: DEFAULT_PORT,
            retention_days: 14,
            test_timeout_secs: 300,
            test_command: "cargo test".to_string(),
            providers: Vec::new(),
            breaker: BreakerConfig::default(),
            default_provider: None,
        }
    }

    /// `for_project` plus `.nexxon/config.toml` plus `NEXXON_PORT`.
    pub fn load(project_root: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        let mut config = Self::for_project(project_root);
        if config.config_file.is_file() {
            let text = std::fs::read_to_string(&config.config_file)
                .map_err(|e| RuntimeError::io(&config.config_file, e))?;
            config.overlay_toml(&text)?;
        }
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply a `config.toml` body on top of the current values.
    pub fn overlay_toml(&mut self, text: &str) -> Result<(), RuntimeError> {
        let file: ConfigFile = toml::from_str(text).map_err(|e| RuntimeError::Config {
            path: self.config_file.display().to_string(),
            reason: e.to_string(),
        })?;
        if let Some(port) = file.port {
            self.port = port;
        }
        if let Some(days) = file.retention_days {
            self.retention_days = days;
        }
        if let Some(secs) = file.test_timeout_secs {
            self.test_timeout_secs = secs;
        }
        if let Some(cmd) = file.test_command {
            self.test_command = cmd;
        }
        if let Some(breaker) = file.breaker {
            self.breaker = breaker;
        }
        if file.default_provider.is_some() {
            self.default_provider = file.default_provider;
        }
        if !file.providers.is_empty() {
            self.providers = file.providers;
        }
        Ok(())
    }

    /// Environment overrides, read through `lookup`.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), RuntimeError> {
        if let Some(raw) = lookup(PORT_ENV) {
            self.port = raw.trim().parse().map_err(|_| RuntimeError::Config {
                path: PORT_ENV.to_string(),
                reason: format!("not a valid port: '{}'", raw),
            })?;
        }
        Ok(())
    }
}
