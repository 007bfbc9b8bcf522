// spec.rs - Configuration-declared providers.
//
// Each `[[providers]]` entry in `.nexxon/config.toml` names a provider, its
// kind, and where its credential comes from. Entries are resolved once at
// startup; an entry that cannot resolve is skipped with a warning.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::breaker::BreakerConfig;
use crate::error::ProviderError;
use crate::http::{Dialect, HttpProvider, ANTHROPIC_BASE_URL, OLLAMA_BASE_URL, OPENAI_BASE_URL};
use crate::mock::MockProvider;
use crate::provider::LlmProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    /// Ollama on the local machine.
    Local,
    Mock,
}

/// Where a provider's API key is read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSource {
    pub env: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub name: String,
    pub kind: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<CredentialSource>,
    /// Per-provider breaker tuning; falls back to the global `[breaker]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breaker: Option<BreakerConfig>,
}

impl ProviderSpec {
    pub fn mock(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ProviderKind::Mock,
            base_url: None,
            model: None,
            credential: None,
            breaker: None,
        }
    }

    /// Environment variable holding the API key, if this kind needs one.
    fn credential_env(&self) -> Option<String> {
        if let Some(source) = &self.credential {
            return Some(source.env.clone());
        }
        match self.kind {
            ProviderKind::OpenAi => Some("OPENAI_API_KEY".to_string()),
            ProviderKind::Anthropic => Some("ANTHROPIC_API_KEY".to_string()),
            ProviderKind::Local | ProviderKind::Mock => None,
        }
    }

    /// Build the provider, reading its credential from the environment.
    pub fn resolve(&self) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    /// Like [`resolve`](Self::resolve) with an explicit variable lookup.
    pub fn resolve_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let api_key = match self.credential_env() {
            Some(env) => match lookup(&env).filter(|v| !v.is_empty()) {
                Some(key) => Some(key),
                None => {
                    return Err(ProviderError::MissingCredential {
                        provider: self.name.clone(),
                        env,
                    })
                }
            },
            None => None,
        };

        let (dialect, default_url) = match self.kind {
            ProviderKind::Mock => return Ok(Arc::new(MockProvider::named(self.name.clone()))),
            ProviderKind::OpenAi => (Dialect::OpenAi, OPENAI_BASE_URL),
            ProviderKind::Anthropic => (Dialect::Anthropic, ANTHROPIC_BASE_URL),
            ProviderKind::Local => (Dialect::Ollama, OLLAMA_BASE_URL),
        };
        let base_url = self.base_url.clone().unwrap_or_else(|| default_url.to_string());
        let mut provider = HttpProvider::new(self.name.clone(), dialect, base_url, api_key);
        if let Some(model) = &self.model {
            provider = provider.with_model(model.clone());
        }
        Ok(Arc::new(provider))
    }
}
