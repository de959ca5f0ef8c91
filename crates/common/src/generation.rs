//! Text generation collaborator
//!
//! Used for query decomposition and final answer synthesis. The chat client
//! speaks the OpenAI-compatible chat completions protocol.

use crate::config::GenerationConfig;
use crate::embeddings::{is_transient_status, retry_policy};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use backoff::future::retry;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Trait for prompt-to-text generation
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a completion for `prompt` under the given system instruction
    async fn generate(&self, system: &str, prompt: &str) -> Result<String>;

    fn model_name(&self) -> &str;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// Chat completions client
pub struct ChatGenerator {
    config: GenerationConfig,
    api_key: String,
    client: reqwest::Client,
}

impl ChatGenerator {
    pub fn new(api_key: String, config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            config: config.clone(),
            api_key,
            client,
        })
    }

    async fn call(
        &self,
        system: &str,
        prompt: &str,
    ) -> std::result::Result<String, backoff::Error<AppError>> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                backoff::Error::transient(AppError::GenerationError {
                    message: format!("LLM API request failed: {}", e),
                })
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let err = AppError::GenerationError {
                message: format!("LLM API error {}: {}", status, body),
            };
            return Err(if is_transient_status(status) {
                backoff::Error::transient(err)
            } else {
                backoff::Error::permanent(err)
            });
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| {
            backoff::Error::permanent(AppError::GenerationError {
                message: format!("Failed to parse LLM response: {}", e),
            })
        })?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                backoff::Error::permanent(AppError::GenerationError {
                    message: "Empty response from LLM".to_string(),
                })
            })
    }
}

#[async_trait]
impl Generator for ChatGenerator {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String> {
        let attempts = AtomicU32::new(0);
        let attempts = &attempts;
        let max_retries = self.config.max_retries;
        let timeout = Duration::from_secs(self.config.timeout_secs);

        retry(retry_policy(timeout, max_retries), || async move {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
            self.call(system, prompt).await.map_err(|e| match e {
                backoff::Error::Transient { err, .. } if attempt <= max_retries => {
                    tracing::warn!(
                        attempt = attempt,
                        max_retries = max_retries,
                        error = %err,
                        "Generation request failed, retrying"
                    );
                    backoff::Error::transient(err)
                }
                backoff::Error::Transient { err, .. } => backoff::Error::permanent(err),
                permanent => permanent,
            })
        })
        .await
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Generator returning fixed text, for offline runs and tests
pub struct StaticGenerator {
    response: String,
}

impl StaticGenerator {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

#[async_trait]
impl Generator for StaticGenerator {
    async fn generate(&self, _system: &str, _prompt: &str) -> Result<String> {
        Ok(self.response.clone())
    }

    fn model_name(&self) -> &str {
        "static"
    }
}

/// Create a generator based on configuration
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "openai" => {
            let key = config
                .api_key
                .clone()
                .filter(|k| !k.is_empty())
                .ok_or_else(|| AppError::Configuration {
                    message: "LLM API key required (APP__GENERATION__API_KEY)".to_string(),
                })?;
            Ok(Arc::new(ChatGenerator::new(key, config)?))
        }
        "static" => Ok(Arc::new(StaticGenerator::new(
            "No language model configured; showing retrieved context only.",
        ))),
        other => Err(AppError::Configuration {
            message: format!("Unknown generation provider: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_generator() {
        let generator = StaticGenerator::new("fixed");
        assert_eq!(generator.generate("sys", "prompt").await.unwrap(), "fixed");
        assert_eq!(generator.model_name(), "static");
    }

    #[test]
    fn test_factory() {
        assert!(matches!(
            create_generator(&GenerationConfig::default()),
            Err(AppError::Configuration { .. })
        ));

        let config = GenerationConfig {
            provider: "static".into(),
            ..Default::default()
        };
        assert_eq!(create_generator(&config).unwrap().model_name(), "static");

        let config = GenerationConfig {
            provider: "carrier-pigeon".into(),
            ..Default::default()
        };
        assert!(create_generator(&config).is_err());
    }

    #[test]
    fn test_chat_response_parsing() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "hello"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("hello"));
    }
}
