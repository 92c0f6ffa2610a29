use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Narration disabled: every completion fails, which the narrator degrades
/// to the deterministic reasoning text.
#[derive(Clone, Debug, Default)]
pub struct NoopLlmClient;

#[async_trait]
impl LlmClient for NoopLlmClient {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(anyhow!("llm narration is disabled"))
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Minimal HTTP completion client against an Ollama-compatible
/// `/api/generate` endpoint.
pub struct HttpLlmClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    max_retries: u32,
}

impl HttpLlmClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            max_retries,
        })
    }

    async fn complete_once(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let mut request = self.http.post(&url).json(&GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        });
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("llm endpoint returned {status}"));
        }

        let payload: GenerateResponse = response.json().await?;
        Ok(payload.response)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            match self.complete_once(prompt).await {
                Ok(response) => return Ok(response),
                Err(error) => {
                    tracing::warn!(
                        event_name = "agent.llm.attempt_failed",
                        attempt,
                        error = %error,
                        "llm completion attempt failed"
                    );
                    last_error = Some(error);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow!("llm completion failed")))
    }
}

#[cfg(test)]
mod tests {
    use super::{LlmClient, NoopLlmClient};

    #[tokio::test]
    async fn noop_client_always_fails() {
        let client = NoopLlmClient;
        assert!(client.complete("anything").await.is_err());
    }
}
