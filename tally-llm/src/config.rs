//! Provider configuration.

use secrecy::SecretString;
use std::time::Duration;
use tally_core::ConfigError;

pub const DEFAULT_BASE_URL: &str = "https://models.github.ai/inference";
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// Settings for the chat-completion provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Bearer token sent to the provider.
    pub api_key: SecretString,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
    /// Upper bound on requests in flight at once.
    pub max_concurrent_requests: usize,
}

impl ProviderConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.5,
            top_p: 1.0,
            max_tokens: 800,
            timeout: Duration::from_secs(60),
            max_concurrent_requests: 8,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Load from environment variables.
    ///
    /// `GITHUB_TOKEN` is required; `TALLY_LLM_BASE_URL`, `TALLY_LLM_MODEL`,
    /// `TALLY_LLM_TIMEOUT_SECS` and `TALLY_LLM_MAX_CONCURRENT` are optional.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("GITHUB_TOKEN")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                field: "GITHUB_TOKEN".to_string(),
            })?;

        let mut config = Self::new(api_key.trim());

        if let Ok(base_url) = std::env::var("TALLY_LLM_BASE_URL") {
            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                return Err(ConfigError::InvalidValue {
                    field: "TALLY_LLM_BASE_URL".to_string(),
                    value: base_url,
                    reason: "must be an http(s) URL".to_string(),
                });
            }
            config = config.with_base_url(base_url);
        }
        if let Ok(model) = std::env::var("TALLY_LLM_MODEL") {
            config.model = model;
        }
        if let Some(secs) = parse_env::<u64>("TALLY_LLM_TIMEOUT_SECS")? {
            config.timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(max) = parse_env::<usize>("TALLY_LLM_MAX_CONCURRENT")? {
            config.max_concurrent_requests = max.max(1);
        }
        Ok(config)
    }
}

fn parse_env<T: std::str::FromStr>(field: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(field) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                field: field.to_string(),
                value: raw,
                reason: "not a number".to_string(),
            }),
        Err(_) => Ok(None),
    }
}
