use anyhow::{Result, anyhow};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::llm_providers::LLMProviderType;

// Import logging macros
use crate::{log_system_event, log_validation};

/// Upper bounds accepted by `Config::validate`
pub const MAX_MODEL_RETRIES: u32 = 5;
pub const MAX_VIDEO_QUERIES: usize = 3;
pub const MAX_RESULTS_PER_QUERY: u32 = 10;

/// Complete application configuration loaded from environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub model: ModelConfig,
    pub video: VideoConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Where courses and learner records live on disk
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub course_root: PathBuf,
    pub data_root: PathBuf,
}

/// Text-generation endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub provider: LLMProviderType,
    pub endpoint_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

/// Video search and transcript source configuration
#[derive(Debug, Clone, Deserialize)]
pub struct VideoConfig {
    pub youtube_api_key: String,
    pub youtube_api_base_url: String,
    pub transcript_base_url: String,
    pub max_queries: usize,
    pub results_per_query: u32,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// Logging system configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub log_directory: String,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Result<Self> {
        log_system_event!(config, "Loading application configuration from environment variables");

        let config = Config {
            storage: StorageConfig::from_env()?,
            model: ModelConfig::from_env()?,
            video: VideoConfig::from_env()?,
            server: ServerConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        };

        log_system_event!(config, "Configuration loaded successfully");
        config.log_configuration_summary();

        Ok(config)
    }

    /// Log a summary of loaded configuration (without sensitive data)
    fn log_configuration_summary(&self) {
        info!(
            course_root = %self.storage.course_root.display(),
            data_root = %self.storage.data_root.display(),
            model_provider = ?self.model.provider,
            model_name = %self.model.model,
            model_endpoint = %self.model.endpoint_url,
            model_api_key_masked = %mask_sensitive_data(&self.model.api_key),
            youtube_api_key_masked = %mask_sensitive_data(&self.video.youtube_api_key),
            server_address = %format!("{}:{}", self.server.host, self.server.port),
            log_level = %self.logging.level,
            "Configuration summary"
        );
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.model.endpoint_url.starts_with("http://")
            && !self.model.endpoint_url.starts_with("https://")
        {
            let error = anyhow!(
                "MODEL_ENDPOINT_URL must start with 'http://' or 'https://', got '{}'",
                self.model.endpoint_url
            );
            log_validation!(failure, "configuration", error = error);
            return Err(error);
        }

        if self.model.model.trim().is_empty() {
            return Err(anyhow!("MODEL_NAME must not be empty"));
        }

        if self.model.timeout_secs == 0 {
            return Err(anyhow!("MODEL_TIMEOUT_SECS must be greater than 0"));
        }

        if self.model.max_retries > MAX_MODEL_RETRIES {
            return Err(anyhow!(
                "MODEL_MAX_RETRIES must be at most {}, got {}",
                MAX_MODEL_RETRIES,
                self.model.max_retries
            ));
        }

        if self.video.max_queries == 0 || self.video.results_per_query == 0 {
            return Err(anyhow!(
                "VIDEO_MAX_QUERIES and VIDEO_RESULTS_PER_QUERY must be greater than 0"
            ));
        }

        if self.video.max_queries > MAX_VIDEO_QUERIES {
            return Err(anyhow!(
                "VIDEO_MAX_QUERIES must be at most {}, got {}",
                MAX_VIDEO_QUERIES,
                self.video.max_queries
            ));
        }

        if self.video.results_per_query > MAX_RESULTS_PER_QUERY {
            return Err(anyhow!(
                "VIDEO_RESULTS_PER_QUERY must be at most {}, got {}",
                MAX_RESULTS_PER_QUERY,
                self.video.results_per_query
            ));
        }

        if self.server.port == 0 {
            return Err(anyhow!("Server port must be greater than 0"));
        }

        if self.model.provider == LLMProviderType::OpenAI && self.model.api_key.is_empty() {
            warn!("MODEL_API_KEY is empty - the OpenAI-compatible endpoint will likely reject requests");
        }

        if self.video.youtube_api_key.is_empty() {
            warn!("YOUTUBE_API_KEY is empty - video discovery will find nothing");
        }

        if !["trace", "debug", "info", "warn", "error"]
            .iter()
            .any(|level| self.logging.level.to_lowercase().starts_with(level))
            && !self.logging.level.contains('=')
        {
            warn!("Invalid log level '{}', using 'info' as fallback", self.logging.level);
        }

        log_validation!(success, "configuration", "Configuration validation completed successfully");
        Ok(())
    }
}

impl StorageConfig {
    pub fn from_env() -> Result<Self> {
        let course_root = env::var("COURSE_ROOT").unwrap_or_else(|_| "languages".to_string());
        let data_root = env::var("DATA_ROOT").unwrap_or_else(|_| "languages_data".to_string());

        Ok(StorageConfig {
            course_root: PathBuf::from(course_root),
            data_root: PathBuf::from(data_root),
        })
    }
}

impl ModelConfig {
    fn from_env() -> Result<Self> {
        let provider_str = env::var("MODEL_PROVIDER").unwrap_or_else(|_| "ollama".to_string());
        let provider = LLMProviderType::parse(&provider_str);

        let endpoint_url = env::var("MODEL_ENDPOINT_URL")
            .or_else(|_| env::var("NGROK_OLLAMA_URL"))
            .unwrap_or_else(|_| provider.default_base_url().to_string());

        let api_key = env::var("MODEL_API_KEY").unwrap_or_default();

        let model = env::var("MODEL_NAME")
            .or_else(|_| env::var("OLLAMA_MODEL"))
            .unwrap_or_else(|_| provider.default_model().to_string());

        let timeout_secs = parse_env_number("MODEL_TIMEOUT_SECS", 180)?;
        let max_retries = parse_env_number("MODEL_MAX_RETRIES", 2)?;
        let retry_backoff_ms = parse_env_number("MODEL_RETRY_BACKOFF_MS", 1000)?;

        Ok(ModelConfig {
            provider,
            endpoint_url,
            api_key,
            model,
            timeout_secs,
            max_retries,
            retry_backoff_ms,
        })
    }
}

impl VideoConfig {
    fn from_env() -> Result<Self> {
        let youtube_api_key = env::var("YOUTUBE_API_KEY").unwrap_or_default();
        let youtube_api_base_url = env::var("YOUTUBE_API_BASE_URL")
            .unwrap_or_else(|_| "https://www.googleapis.com/youtube/v3".to_string());
        let transcript_base_url = env::var("TRANSCRIPT_BASE_URL")
            .unwrap_or_else(|_| "https://www.youtube.com".to_string());
        let max_queries = parse_env_number("VIDEO_MAX_QUERIES", 3)?;
        let results_per_query = parse_env_number("VIDEO_RESULTS_PER_QUERY", 1)?;

        Ok(VideoConfig {
            youtube_api_key,
            youtube_api_base_url,
            transcript_base_url,
            max_queries,
            results_per_query,
        })
    }
}

impl ServerConfig {
    fn from_env() -> Result<Self> {
        let port = parse_env_number("PORT", 3000)?;
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        Ok(ServerConfig { port, host })
    }
}

impl LoggingConfig {
    fn from_env() -> Result<Self> {
        let level = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info,course_generator=debug".to_string());

        let file_enabled = env::var("LOG_FILE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let console_enabled = env::var("LOG_CONSOLE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let log_directory = env::var("LOG_DIRECTORY").unwrap_or_else(|_| "logs".to_string());

        Ok(LoggingConfig {
            level,
            file_enabled,
            console_enabled,
            log_directory,
        })
    }
}

fn parse_env_number<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow!("Invalid {} value: '{}'. Must be a non-negative number", name, raw)),
        Err(_) => Ok(default),
    }
}

/// Mask sensitive data in configuration for safe logging
fn mask_sensitive_data(data: &str) -> String {
    let chars: Vec<char> = data.chars().collect();
    if chars.len() <= 8 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}***{}", head, tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            storage: StorageConfig {
                course_root: PathBuf::from("languages"),
                data_root: PathBuf::from("languages_data"),
            },
            model: ModelConfig {
                provider: LLMProviderType::Ollama,
                endpoint_url: "https://abcd.ngrok.io".to_string(),
                api_key: String::new(),
                model: "phi3:14b".to_string(),
                timeout_secs: 180,
                max_retries: 2,
                retry_backoff_ms: 1000,
            },
            video: VideoConfig {
                youtube_api_key: "AIza-test-key-123".to_string(),
                youtube_api_base_url: "https://www.googleapis.com/youtube/v3".to_string(),
                transcript_base_url: "https://www.youtube.com".to_string(),
                max_queries: 3,
                results_per_query: 1,
            },
            server: ServerConfig {
                port: 3000,
                host: "0.0.0.0".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_enabled: true,
                console_enabled: true,
                log_directory: "logs".to_string(),
            },
        }
    }

    #[test]
    fn test_mask_sensitive_data() {
        assert_eq!(mask_sensitive_data("short"), "*****");
        assert_eq!(mask_sensitive_data(""), "");
        assert_eq!(mask_sensitive_data("sk-1234567890abcdef"), "sk-1***cdef");
    }

    #[test]
    fn test_config_validation() {
        let config = valid_config();
        assert!(config.validate().is_ok());

        let mut invalid = config.clone();
        invalid.server.port = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.model.endpoint_url = "ftp://example.com".to_string();
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.model.timeout_secs = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = config;
        invalid.video.max_queries = 0;
        assert!(invalid.validate().is_err());
    }
}
