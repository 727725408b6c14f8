//! Chat completion client
//!
//! Thin abstraction over the external reasoning service consumed by the
//! relevance scorer and the query planner. The service sees a single user
//! prompt and returns raw text; callers own prompt construction and response
//! parsing.

use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Trait for single-turn completions
#[async_trait]
pub trait ChatCompleter: Send + Sync {
    /// Send one prompt, get the raw completion text back
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// OpenAI-compatible chat completions client
pub struct OpenAiChat {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    max_retries: u32,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

impl OpenAiChat {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        model: String,
        timeout: Duration,
        max_retries: u32,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key,
            model,
            base_url,
            max_retries,
        }
    }

    pub fn from_config(config: &crate::config::ChatConfig) -> Self {
        Self::new(
            config.api_base.clone(),
            config.api_key.clone(),
            config.model.clone(),
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )
    }

    async fn make_request(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: prompt.to_string(),
            }],
            // Scoring and planning both want reproducible output
            temperature: 0.0,
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await.map_err(|e| AppError::ChatError {
            message: format!("Request failed: {}", e),
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ChatError {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: ChatResponse = response.json().await.map_err(|e| AppError::ChatError {
            message: format!("Failed to parse response: {}", e),
        })?;

        result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AppError::ChatError {
                message: "Empty response".to_string(),
            })
    }
}

#[async_trait]
impl ChatCompleter for OpenAiChat {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut last_error = None;

        for attempt in 0..self.max_retries.max(1) {
            if attempt > 0 {
                let delay = Duration::from_millis(250 * (2_u64.pow(attempt)));
                tokio::time::sleep(delay).await;
            }

            match self.make_request(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %e,
                        "Chat completion failed, retrying"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::ChatError {
            message: "Unknown error after retries".to_string(),
        }))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Canned completer for tests
pub struct StaticChat {
    reply: String,
}

impl StaticChat {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }
}

#[async_trait]
impl ChatCompleter for StaticChat {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Ok(self.reply.clone())
    }

    fn model_name(&self) -> &str {
        "static"
    }
}
