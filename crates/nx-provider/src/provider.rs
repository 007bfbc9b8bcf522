// provider.rs - The LLM provider capability.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ProviderError;

pub const DEFAULT_MAX_TOKENS: u64 = 4096;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-call knobs. Unset fields fall back to the provider's defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionOptions {
    pub model: Option<String>,
    pub max_tokens: Option<u64>,
    pub temperature: Option<f32>,
    /// Client-side request timeout; the breaker does not bound call duration.
    pub timeout: Option<Duration>,
}

impl CompletionOptions {
    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn max_tokens_or_default(&self) -> u64 {
        self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
    }

    pub fn timeout_or_default(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT)
    }
}

/// A text-completion backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Registry key for this provider.
    fn name(&self) -> &str;

    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, ProviderError>;

    async fn health_check(&self) -> bool;

    /// Remote host contacted by `complete`, for outbound network policy.
    /// `None` for providers that never leave the machine.
    fn endpoint_host(&self) -> Option<String>;
}
