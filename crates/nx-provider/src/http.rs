// http.rs - HTTP-backed providers (OpenAI-compatible, Anthropic, Ollama).
//
// All three speak JSON over HTTPS/HTTP and differ only in endpoint path,
// auth header, request body, and where the text sits in the response.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::error::ProviderError;
use crate::provider::{CompletionOptions, LlmProvider};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Wire format spoken by an [`HttpProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `/chat/completions`, bearer auth.
    OpenAi,
    /// `/messages`, `x-api-key` auth.
    Anthropic,
    /// `/api/generate`, no auth, runs on the local machine.
    Ollama,
}

impl Dialect {
    fn default_model(self) -> &'static str {
        match self {
            Dialect::OpenAi => "gpt-4o-mini",
            Dialect::Anthropic => "claude-sonnet-4-20250514",
            Dialect::Ollama => "codellama",
        }
    }
}

pub struct HttpProvider {
    name: String,
    dialect: Dialect,
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpProvider {
    pub fn new(
        name: impl Into<String>,
        dialect: Dialect,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            dialect,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: dialect.default_model().to_string(),
            api_key,
            client: Client::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn request_body(&self, prompt: &str, options: &CompletionOptions) -> Value {
        let model = options.model.clone().unwrap_or_else(|| self.model.clone());
        let temperature = options.temperature.unwrap_or(0.3);
        let max_tokens = options.max_tokens_or_default();
        match self.dialect {
            Dialect::OpenAi => json!({
                "model": model,
                "messages": [{"role": "user", "content": prompt}],
                "temperature": temperature,
                "max_tokens": max_tokens,
            }),
            Dialect::Anthropic => json!({
                "model": model,
                "messages": [{"role": "user", "content": prompt}],
                "temperature": temperature,
                "max_tokens": max_tokens,
            }),
            Dialect::Ollama => json!({
                "model": model,
                "prompt": prompt,
                "options": {"temperature": temperature},
                "stream": false,
            }),
        }
    }

    fn endpoint(&self) -> String {
        let path = match self.dialect {
            Dialect::OpenAi => "/chat/completions",
            Dialect::Anthropic => "/messages",
            Dialect::Ollama => "/api/generate",
        };
        format!("{}{}", self.base_url, path)
    }

    fn extract_text(&self, body: &Value) -> String {
        let text = match self.dialect {
            Dialect::OpenAi => body["choices"][0]["message"]["content"].as_str(),
            Dialect::Anthropic => body["content"][0]["text"].as_str(),
            Dialect::Ollama => body["response"].as_str(),
        };
        text.unwrap_or_default().to_string()
    }
}

#[async_trait]
impl LlmProvider for HttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, ProviderError> {
        let mut request = self
            .client
            .post(self.endpoint())
            .timeout(options.timeout_or_default())
            .json(&self.request_body(prompt, options));

        request = match (self.dialect, &self.api_key) {
            (Dialect::OpenAi, Some(key)) => request.bearer_auth(key),
            (Dialect::Anthropic, Some(key)) => request
                .header("x-api-key", key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            _ => request,
        };

        tracing::debug!(provider = %self.name, endpoint = %self.endpoint(), "provider request");
        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(&self.name, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(&self.name, status.as_u16(), &body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest(&self.name, e))?;
        Ok(self.extract_text(&body))
    }

    async fn health_check(&self) -> bool {
        match self.dialect {
            Dialect::Ollama => self
                .client
                .get(format!("{}/api/tags", self.base_url))
                .send()
                .await
                .map(|r| r.status().is_success())
                .unwrap_or(false),
            _ => self
                .complete("test", &CompletionOptions::default().with_max_tokens(5))
                .await
                .is_ok(),
        }
    }

    fn endpoint_host(&self) -> Option<String> {
        if self.dialect == Dialect::Ollama {
            return None;
        }
        reqwest::Url::parse(&self.base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }
}
