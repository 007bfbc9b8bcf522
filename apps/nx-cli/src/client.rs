// client.rs - Blocking HTTP client for the runtime's envelope endpoint.

use std::time::Duration;

use anyhow::Context;
use reqwest::blocking::Client;
use serde_json::Value;

use nx_protocol::{RequestEnvelope, ResponseEnvelope};

pub const DEFAULT_RUNTIME_URL: &str = "http://127.0.0.1:7777";

/// Long enough for a full test run; the runtime bounds the run itself.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15 * 60);

pub struct RuntimeClient {
    base_url: String,
    http: Client,
}

impl RuntimeClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn send(&self, request: &RequestEnvelope) -> anyhow::Result<ResponseEnvelope> {
        let url = format!("{}/api/v1", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .with_context(|| {
                format!(
                    "could not reach the runtime at {} (is `nexxon serve` running?)",
                    self.base_url
                )
            })?;
        let body: Value = response
            .json()
            .context("runtime returned a body that is not JSON")?;
        serde_json::from_value(body).context("runtime returned an invalid response envelope")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = RuntimeClient::new("http://127.0.0.1:7777/").unwrap();
        assert_eq!(client.base_url, "http://127.0.0.1:7777");
    }
}
