use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::ModelConfig;
use crate::errors::{CourseError, CourseResult};
use crate::llm_providers::{GenerationOptions, LLMProvider, LLMProviderFactory, LLMProviderType};
use crate::prompts::Prompt;

// Import logging macros
use crate::log_llm_operation;

/// Anything that can turn a prompt into raw model text.
///
/// The service layer only talks to this trait so tests can script replies.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, prompt: &Prompt, options: &GenerationOptions) -> CourseResult<String>;
}

#[derive(Debug, Clone)]
pub struct LLMService {
    provider: LLMProvider,
    max_retries: u32,
    retry_backoff: Duration,
}

impl LLMService {
    pub fn new(provider: LLMProvider, max_retries: u32, retry_backoff: Duration) -> Self {
        Self {
            provider,
            max_retries,
            retry_backoff,
        }
    }

    pub fn new_with_provider(
        provider_type: LLMProviderType,
        api_key: String,
        base_url: Option<String>,
        model: Option<String>,
        timeout: Duration,
    ) -> Self {
        let provider =
            LLMProviderFactory::create_provider(provider_type, api_key, base_url, model, timeout);
        Self::new(provider, 2, Duration::from_secs(1))
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        let provider = LLMProviderFactory::create_provider(
            config.provider,
            config.api_key.clone(),
            Some(config.endpoint_url.clone()),
            Some(config.model.clone()),
            Duration::from_secs(config.timeout_secs),
        );
        Self::new(
            provider,
            config.max_retries,
            Duration::from_millis(config.retry_backoff_ms),
        )
    }

    /// Get the provider name for logging and testing
    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }

    /// Get the model name being used
    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        self.retry_backoff.saturating_mul(2u32.saturating_pow(attempt))
    }
}

#[async_trait]
impl TextGenerator for LLMService {
    /// Send the prompt, retrying transport errors, non-2xx answers and empty
    /// replies up to `max_retries` extra times with exponential backoff.
    async fn complete(&self, prompt: &Prompt, options: &GenerationOptions) -> CourseResult<String> {
        let attempts = self.max_retries.saturating_add(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            let started = Instant::now();
            log_llm_operation!(
                start,
                provider = self.provider_name(),
                model = self.model_name(),
                prompt_chars = prompt.user.chars().count()
            );

            match self.provider.make_request(prompt, options).await {
                Ok(text) if !text.trim().is_empty() => {
                    log_llm_operation!(
                        success,
                        provider = self.provider_name(),
                        duration_ms = started.elapsed().as_millis() as u64,
                        response_chars = text.chars().count()
                    );
                    debug!(raw_response = %text, "Raw LLM response");
                    return Ok(text);
                }
                Ok(_) => {
                    last_error = "empty response".to_string();
                    log_llm_operation!(warn, "model returned an empty response");
                }
                Err(e) => {
                    log_llm_operation!(
                        error,
                        provider = self.provider_name(),
                        error = e,
                        retry_count = attempt
                    );
                    last_error = e.to_string();
                }
            }

            if attempt + 1 < attempts {
                tokio::time::sleep(self.backoff_for(attempt)).await;
            }
        }

        Err(CourseError::GenerationUnavailable(format!(
            "{} failed after {} attempts: {}",
            self.provider_name(),
            attempts,
            last_error
        )))
    }
}
