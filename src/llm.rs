//! Text generation and classification capability.
//!
//! The [`ChatModel`] trait covers the two language-model calls the agent
//! makes: a deterministic classification used for routing, and a free-form
//! generation that produces the final answer. The HTTP implementation
//! targets an OpenAI-compatible chat-completions endpoint and shares the
//! retry/backoff policy of the embedding client.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::LlmConfig;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;
    /// One completion at temperature 0, used for routing decisions.
    async fn classify(&self, prompt: &str) -> Result<String>;
    /// One completion producing the final answer text.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Chat model backed by an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiChatModel {
    model: String,
    temperature: f64,
    api_base: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiChatModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            api_base: config
                .api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            api_key,
            max_retries: config.max_retries,
            client,
        })
    }

    async fn complete(&self, prompt: &str, temperature: f64) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": temperature,
            "messages": [{"role": "user", "content": prompt}],
        });

        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_completion_response(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("chat API error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("chat API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Completion failed after retries")))
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn classify(&self, prompt: &str) -> Result<String> {
        self.complete(prompt, 0.0).await
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.complete(prompt, self.temperature).await
    }
}

/// Extract `choices[0].message.content` from a chat-completions response.
fn parse_completion_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
        .map(|s| s.to_string())
        .context("Invalid chat response: missing choices[0].message.content")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_completion_response() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "rag"}}]
        });
        assert_eq!(parse_completion_response(&json).unwrap(), "rag");
    }

    #[test]
    fn empty_choices_is_an_error() {
        let json = serde_json::json!({"choices": []});
        assert!(parse_completion_response(&json).is_err());
    }
}
