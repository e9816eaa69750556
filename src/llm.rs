//! LLM completion client
//!
//! The pipeline treats the model as a black box: a prompt goes in, text
//! comes out. Everything model-specific lives behind `CompletionClient`,
//! with an OpenAI-compatible HTTP implementation (the serving stack the
//! agents run against) and a scripted mock for tests and offline use.
//! Uses a long-lived reqwest::Client for connection pooling.

use crate::config::LlmConfig;
use crate::error::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{error, info};

/// Black-box text completion: system instruction + user prompt → text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, instruction: &str, prompt: &str) -> crate::Result<String>;
}

/// Client for an OpenAI-compatible chat-completions endpoint
/// (connection-pooled).
pub struct OpenAiCompatClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatClient {
    pub fn new(config: LlmConfig) -> crate::Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()
            .map_err(PipelineError::HttpError)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            model: config.model,
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatClient {
    async fn complete(&self, instruction: &str, prompt: &str) -> crate::Result<String> {
        if self.api_key.is_empty() {
            return Err(PipelineError::ConfigError(
                "LLM_API_KEY not configured".to_string(),
            ));
        }

        let url = format!("{}/chat/completions", self.base_url);

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: instruction.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: 0.3,
            max_tokens: 1024,
        };

        info!(model = %self.model, "Calling LLM endpoint");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("LLM request failed: {}", e);
                PipelineError::LlmError(format!("LLM request error: {}", e))
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("LLM error response: {}", error_text);
            return Err(PipelineError::LlmError(format!(
                "LLM endpoint error: {}",
                error_text
            )));
        }

        let completion: ChatCompletionResponse = response.json().await.map_err(|e| {
            error!("Failed to parse LLM response: {}", e);
            PipelineError::LlmError(format!("LLM parse error: {}", e))
        })?;

        let answer = completion
            .choices
            .first()
            .map(|choice| choice.message.content.clone())
            .ok_or_else(|| PipelineError::LlmError("Empty response from LLM".to_string()))?;

        Ok(answer)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: i32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Scripted completion client for development & testing.
/// Keeps the pipeline functional without an LLM dependency: responses
/// are returned in call order, repeating the last one when exhausted.
pub struct MockCompletionClient {
    responses: Vec<String>,
    cursor: AtomicUsize,
}

impl MockCompletionClient {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses,
            cursor: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CompletionClient for MockCompletionClient {
    async fn complete(&self, _instruction: &str, _prompt: &str) -> crate::Result<String> {
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        let response = self
            .responses
            .get(index)
            .or_else(|| self.responses.last())
            .cloned()
            .unwrap_or_default();
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = ChatCompletionRequest {
            model: "Qwen/Qwen3-8B".to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: "iPhone 15 còn hàng không?".to_string(),
            }],
            temperature: 0.3,
            max_tokens: 1024,
        };

        let json = serde_json::to_string(&request);
        assert!(json.is_ok());
        assert!(json.unwrap().contains("iPhone 15"));
    }

    #[tokio::test]
    async fn test_mock_client_replays_in_order() {
        let mock = MockCompletionClient::new(vec!["một".to_string(), "hai".to_string()]);
        assert_eq!(mock.complete("", "").await.unwrap(), "một");
        assert_eq!(mock.complete("", "").await.unwrap(), "hai");
        // Exhausted: repeats the last scripted response.
        assert_eq!(mock.complete("", "").await.unwrap(), "hai");
    }
}
