//! Completion client integration using siumai
//!
//! This module provides the production `CompletionService`, backed by any
//! provider the siumai framework supports.

use deepcite_core::{
    async_trait, retry_async, CompletionService, DeepciteError, DeepciteResult, ErrorContext,
    LlmConfig, RetryConfig,
};
use siumai::prelude::*;
use std::time::Instant;
use tracing::{debug, info};

/// Completion client that supports multiple providers
pub struct SiumaiCompletion {
    client: Box<dyn LlmClient + Send + Sync>,
    config: LlmConfig,
    retry: RetryConfig,
}

impl SiumaiCompletion {
    /// Create a new completion client
    pub async fn new(config: LlmConfig, retry: RetryConfig) -> DeepciteResult<Self> {
        let client = Self::build_client(&config).await?;

        info!(
            "Created completion client for provider: {} with model: {}",
            config.provider, config.model
        );

        Ok(Self {
            client,
            config,
            retry,
        })
    }

    fn missing_key(config: &LlmConfig) -> DeepciteError {
        let var = config.api_key_env_var().unwrap_or("the provider API key");
        DeepciteError::Config {
            message: format!("{} API key not found", config.provider),
            source: None,
            context: ErrorContext::new("llm_client")
                .with_operation("build_client")
                .with_suggestion(&format!("Set {} or llm.api_key in the config file", var)),
        }
    }

    fn build_failed(config: &LlmConfig, error: impl std::fmt::Display) -> DeepciteError {
        DeepciteError::Completion {
            message: format!("Failed to build {} client: {}", config.provider, error),
            provider: Some(config.provider.clone()),
            model: Some(config.model.clone()),
            context: ErrorContext::new("llm_client").with_operation("build_client"),
        }
    }

    /// Build the appropriate siumai client based on configuration
    async fn build_client(config: &LlmConfig) -> DeepciteResult<Box<dyn LlmClient + Send + Sync>> {
        match config.provider.as_str() {
            "groq" => {
                let api_key = config.api_key.clone().ok_or_else(|| Self::missing_key(config))?;

                let mut builder = LlmBuilder::new()
                    .groq()
                    .api_key(&api_key)
                    .model(&config.model)
                    .temperature(config.temperature);

                if let Some(max_tokens) = config.max_tokens {
                    builder = builder.max_tokens(max_tokens);
                }

                let client = builder
                    .build()
                    .await
                    .map_err(|e| Self::build_failed(config, e))?;

                Ok(Box::new(client))
            }
            "openai" => {
                let api_key = config.api_key.clone().ok_or_else(|| Self::missing_key(config))?;

                let mut builder = LlmBuilder::new()
                    .openai()
                    .api_key(&api_key)
                    .model(&config.model)
                    .temperature(config.temperature);

                if let Some(max_tokens) = config.max_tokens {
                    builder = builder.max_tokens(max_tokens);
                }

                if let Some(base_url) = &config.base_url {
                    builder = builder.base_url(base_url);
                }

                let client = builder
                    .build()
                    .await
                    .map_err(|e| Self::build_failed(config, e))?;

                Ok(Box::new(client))
            }
            "anthropic" => {
                let api_key = config.api_key.clone().ok_or_else(|| Self::missing_key(config))?;

                let mut builder = LlmBuilder::new()
                    .anthropic()
                    .api_key(&api_key)
                    .model(&config.model)
                    .temperature(config.temperature);

                if let Some(max_tokens) = config.max_tokens {
                    builder = builder.max_tokens(max_tokens);
                }

                let client = builder
                    .build()
                    .await
                    .map_err(|e| Self::build_failed(config, e))?;

                Ok(Box::new(client))
            }
            "ollama" => {
                let base_url = config
                    .base_url
                    .clone()
                    .unwrap_or_else(|| "http://localhost:11434".to_string());

                let mut builder = LlmBuilder::new()
                    .ollama()
                    .model(&config.model)
                    .base_url(&base_url)
                    .temperature(config.temperature);

                if let Some(max_tokens) = config.max_tokens {
                    builder = builder.max_tokens(max_tokens);
                }

                let client = builder
                    .build()
                    .await
                    .map_err(|e| Self::build_failed(config, e))?;

                Ok(Box::new(client))
            }
            provider => Err(DeepciteError::Config {
                message: format!("Unsupported LLM provider: {}", provider),
                source: None,
                context: ErrorContext::new("llm_client")
                    .with_operation("build_client")
                    .with_suggestion("Use one of: groq, openai, anthropic, ollama"),
            }),
        }
    }

    /// Map a provider failure onto the error taxonomy used for retries
    fn classify_failure(&self, message: String) -> DeepciteError {
        let lowered = message.to_lowercase();
        let context = ErrorContext::new("llm_client")
            .with_operation("complete")
            .with_metadata("provider", &self.config.provider)
            .with_metadata("model", &self.config.model);

        if lowered.contains("rate limit") || lowered.contains("429") {
            DeepciteError::RateLimit {
                message,
                retry_after_ms: None,
                context,
            }
        } else if lowered.contains("timeout")
            || lowered.contains("timed out")
            || lowered.contains("connection")
        {
            DeepciteError::Network {
                message,
                source: None,
                context,
            }
        } else {
            DeepciteError::Completion {
                message,
                provider: Some(self.config.provider.clone()),
                model: Some(self.config.model.clone()),
                context,
            }
        }
    }

    async fn complete_once(&self, prompt: &str) -> DeepciteResult<String> {
        let start_time = Instant::now();
        let messages = vec![ChatMessage::user(prompt).build()];

        let response = self
            .client
            .chat(messages)
            .await
            .map_err(|e| self.classify_failure(format!("LLM generation failed: {}", e)))?;

        match response.content_text() {
            Some(content) => {
                debug!(
                    "Generated response in {:?} ({} chars)",
                    start_time.elapsed(),
                    content.len()
                );
                Ok(content.to_string())
            }
            None => Err(DeepciteError::Completion {
                message: "No text content in LLM response".to_string(),
                provider: Some(self.config.provider.clone()),
                model: Some(self.config.model.clone()),
                context: ErrorContext::new("llm_client").with_operation("complete"),
            }),
        }
    }

    /// Get the current configuration
    pub fn config(&self) -> &LlmConfig {
        &self.config
    }
}

#[async_trait]
impl CompletionService for SiumaiCompletion {
    async fn complete(&self, prompt: &str) -> DeepciteResult<String> {
        retry_async(|| self.complete_once(prompt), &self.retry, "llm_complete").await
    }

    fn describe(&self) -> String {
        format!(
            "{}/{} (temp: {:.1})",
            self.config.provider, self.config.model, self.config.temperature
        )
    }
}
