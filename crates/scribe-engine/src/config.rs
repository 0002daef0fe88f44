//! Engine configuration.
//!
//! All knobs are process-wide: one `EngineConfig` is constructed up front
//! and shared by every job. Durations are (de)serialized as humantime
//! strings ("30s", "10m") so configs stay readable.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::provider::DEFAULT_ENDPOINT;
use crate::retry::RetryConfig;

/// Serde adapter for humantime duration strings.
pub(crate) mod duration_str {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        humantime::format_duration(*duration)
            .to_string()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

/// Invalid configuration values.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("endpoint must start with http:// or https://, got '{0}'")]
    InvalidEndpoint(String),

    #[error("rate_limit must be at least 1")]
    ZeroRateLimit,

    #[error("retry.max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("temperature must be within 0.0..=2.0, got {0}")]
    TemperatureOutOfRange(f32),

    #[error("max_prompt_words must be at least 1")]
    ZeroPromptLimit,
}

/// Response cache sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries
    pub max_entries: u64,

    /// Time-to-live per entry
    #[serde(with = "duration_str")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 500,
            ttl: Duration::from_secs(600),
        }
    }
}

/// Process-wide engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Chat-completions endpoint URL
    pub endpoint: String,

    /// Model identifier
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Default generation budget per job, in tokens
    pub max_tokens: u32,

    /// Rendered prompts above this word count are rejected before any
    /// network or cache interaction
    pub max_prompt_words: u32,

    /// Floor for dynamically derived generation budgets
    pub min_completion_tokens: u32,

    /// Requests per second; also sizes the in-flight permit pool
    pub rate_limit: u32,

    /// Overall per-attempt timeout (connect + read)
    #[serde(with = "duration_str")]
    pub request_timeout: Duration,

    /// Response cache sizing
    pub cache: CacheConfig,

    /// Retry behavior
    pub retry: RetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.8,
            max_tokens: 650,
            max_prompt_words: 4000,
            min_completion_tokens: 50,
            rate_limit: 5,
            request_timeout: Duration::from_secs(30),
            cache: CacheConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Create a config for the given model, defaults elsewhere.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(ConfigError::InvalidEndpoint(self.endpoint.clone()));
        }
        if self.rate_limit == 0 {
            return Err(ConfigError::ZeroRateLimit);
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::TemperatureOutOfRange(self.temperature));
        }
        if self.max_prompt_words == 0 {
            return Err(ConfigError::ZeroPromptLimit);
        }
        Ok(())
    }
}
