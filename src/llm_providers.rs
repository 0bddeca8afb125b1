use anyhow::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

use crate::prompts::Prompt;

/// Common message structure for chat-style LLM requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMMessage {
    pub role: String,
    pub content: String,
}

/// Sampling options forwarded to the endpoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 2048,
        }
    }
}

impl GenerationOptions {
    /// A full 7×10×10 curriculum needs a much larger output budget
    pub fn for_curriculum() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 8192,
        }
    }
}

fn chat_messages(prompt: &Prompt) -> Vec<LLMMessage> {
    vec![
        LLMMessage {
            role: "system".to_string(),
            content: prompt.system.clone(),
        },
        LLMMessage {
            role: "user".to_string(),
            content: prompt.user.clone(),
        },
    ]
}

fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

/// Enum-based LLM provider implementation
#[derive(Debug, Clone)]
pub enum LLMProvider {
    Ollama(OllamaProvider),
    OpenAI(OpenAIProvider),
}

impl LLMProvider {
    pub async fn make_request(&self, prompt: &Prompt, options: &GenerationOptions) -> Result<String> {
        match self {
            LLMProvider::Ollama(provider) => provider.make_request(prompt, options).await,
            LLMProvider::OpenAI(provider) => provider.make_request(prompt, options).await,
        }
    }

    /// Get the provider name for logging
    pub fn provider_name(&self) -> &'static str {
        match self {
            LLMProvider::Ollama(provider) => provider.provider_name(),
            LLMProvider::OpenAI(provider) => provider.provider_name(),
        }
    }

    /// Get the model name being used
    pub fn model_name(&self) -> &str {
        match self {
            LLMProvider::Ollama(provider) => provider.model_name(),
            LLMProvider::OpenAI(provider) => provider.model_name(),
        }
    }
}

/// Ollama chat endpoint, usually reached through an ngrok tunnel
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    api_key: String,
    chat_url: String,
    model: String,
}

#[derive(Debug, Clone, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<LLMMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Clone, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Ollama answers `{message: {content}}`; some proxies flatten it to
/// `{content}` and the generate endpoint uses `{response}`
#[derive(Debug, Clone, Deserialize)]
struct OllamaResponse {
    message: Option<LLMMessage>,
    content: Option<String>,
    response: Option<String>,
}

impl OllamaResponse {
    fn into_text(self) -> Option<String> {
        self.message
            .map(|message| message.content)
            .or(self.content)
            .or(self.response)
    }
}

impl OllamaProvider {
    pub fn new(api_key: String, base_url: Option<String>, model: Option<String>, timeout: Duration) -> Self {
        let base_url = base_url.unwrap_or_else(|| LLMProviderType::Ollama.default_base_url().to_string());
        let base_url = base_url.trim_end_matches('/');
        let chat_url = if base_url.ends_with("/api/chat") {
            base_url.to_string()
        } else {
            format!("{}/api/chat", base_url)
        };

        Self {
            client: build_client(timeout),
            api_key,
            chat_url,
            model: model.unwrap_or_else(|| LLMProviderType::Ollama.default_model().to_string()),
        }
    }

    pub async fn make_request(&self, prompt: &Prompt, options: &GenerationOptions) -> Result<String> {
        let request_body = OllamaRequest {
            model: self.model.clone(),
            messages: chat_messages(prompt),
            stream: false,
            options: OllamaOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
            },
        };

        info!(
            provider = self.provider_name(),
            model = %self.model,
            url = %self.chat_url,
            prompt_length = prompt.user.len(),
            "Making LLM request"
        );

        let mut request = self.client.post(&self.chat_url).json(&request_body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(
                provider = self.provider_name(),
                status = %status,
                error = %error_text,
                "LLM API request failed"
            );
            return Err(anyhow::anyhow!("Ollama request failed with status {}: {}", status, error_text));
        }

        let ollama_response: OllamaResponse = response.json().await?;
        let response_content = ollama_response
            .into_text()
            .ok_or_else(|| anyhow::anyhow!("No content in Ollama response"))?;

        if response_content.trim().is_empty() {
            return Err(anyhow::anyhow!("Empty content in Ollama response"));
        }

        info!(
            provider = self.provider_name(),
            response_length = response_content.len(),
            "Successfully received LLM response"
        );

        Ok(response_content)
    }

    pub fn provider_name(&self) -> &'static str {
        "Ollama"
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }
}

/// OpenAI-compatible chat completions endpoint
#[derive(Debug, Clone)]
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Clone, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<LLMMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenAIChoice {
    message: LLMMessage,
}

impl OpenAIProvider {
    pub fn new(api_key: String, base_url: Option<String>, model: Option<String>, timeout: Duration) -> Self {
        Self {
            client: build_client(timeout),
            api_key,
            base_url: base_url
                .unwrap_or_else(|| LLMProviderType::OpenAI.default_base_url().to_string())
                .trim_end_matches('/')
                .to_string(),
            model: model.unwrap_or_else(|| LLMProviderType::OpenAI.default_model().to_string()),
        }
    }

    pub async fn make_request(&self, prompt: &Prompt, options: &GenerationOptions) -> Result<String> {
        let request_body = OpenAIRequest {
            model: self.model.clone(),
            messages: chat_messages(prompt),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };

        info!(
            provider = self.provider_name(),
            model = %self.model,
            base_url = %self.base_url,
            prompt_length = prompt.user.len(),
            "Making LLM request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(
                provider = self.provider_name(),
                status = %status,
                error = %error_text,
                "LLM API request failed"
            );
            return Err(anyhow::anyhow!("OpenAI API request failed with status {}: {}", status, error_text));
        }

        let openai_response: OpenAIResponse = response.json().await?;
        let response_content = openai_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow::anyhow!("No choices in OpenAI response"))?;

        info!(
            provider = self.provider_name(),
            response_length = response_content.len(),
            "Successfully received LLM response"
        );

        Ok(response_content)
    }

    pub fn provider_name(&self) -> &'static str {
        "OpenAI"
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum LLMProviderType {
    Ollama,
    OpenAI,
}

impl LLMProviderType {
    /// Parse a provider name; unknown names fall back to Ollama
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "openai" | "chatgpt" | "gpt" => LLMProviderType::OpenAI,
            "ollama" | "local" | "ngrok" => LLMProviderType::Ollama,
            _ => {
                info!("Unknown LLM provider '{}', defaulting to Ollama", name);
                LLMProviderType::Ollama
            }
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            LLMProviderType::Ollama => "http://localhost:11434",
            LLMProviderType::OpenAI => "https://api.openai.com/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LLMProviderType::Ollama => "phi3:14b",
            LLMProviderType::OpenAI => "gpt-4o-mini",
        }
    }
}

/// Factory for creating LLM providers based on provider type
pub struct LLMProviderFactory;

impl LLMProviderFactory {
    pub fn create_provider(
        provider_type: LLMProviderType,
        api_key: String,
        base_url: Option<String>,
        model: Option<String>,
        timeout: Duration,
    ) -> LLMProvider {
        match provider_type {
            LLMProviderType::Ollama => {
                LLMProvider::Ollama(OllamaProvider::new(api_key, base_url, model, timeout))
            }
            LLMProviderType::OpenAI => {
                LLMProvider::OpenAI(OpenAIProvider::new(api_key, base_url, model, timeout))
            }
        }
    }
}
