// mock.rs - Deterministic offline provider.
//
// Registered when no configured provider resolves, so a default always
// exists. Planning prompts get a fixed JSON plan; anything else gets an
// empty completion, which callers treat as "no change".

use async_trait::async_trait;
use serde_json::json;

use crate::error::ProviderError;
use crate::provider::{CompletionOptions, LlmProvider};

pub const MOCK_PROVIDER: &str = "mock";

#[derive(Debug, Clone)]
pub struct MockProvider {
    name: String,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            name: MOCK_PROVIDER.to_string(),
        }
    }

    /// A mock registered under another name, useful for multi-provider setups.
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        prompt: &str,
        _options: &CompletionOptions,
    ) -> Result<String, ProviderError> {
        if prompt
            .to_lowercase()
            .contains("generate a step-by-step plan")
        {
            let plan = json!({
                "plan_steps": [
                    "Understand the task and constraints",
                    "Locate relevant files",
                    "Apply small, safe code changes",
                    "Run tests and iterate"
                ],
                "files_to_modify": [],
                "confidence": "low"
            });
            return Ok(plan.to_string());
        }
        Ok(String::new())
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn endpoint_host(&self) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plan_prompt_yields_json_plan() {
        let out = MockProvider::new()
            .complete(
                "Generate a step-by-step plan to do X",
                &CompletionOptions::default(),
            )
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["plan_steps"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn other_prompts_yield_empty() {
        let out = MockProvider::new()
            .complete("rewrite this file", &CompletionOptions::default())
            .await
            .unwrap();
        assert!(out.is_empty());
        assert!(MockProvider::new().endpoint_host().is_none());
    }
}
