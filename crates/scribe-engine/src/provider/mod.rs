//! Completion provider abstraction.
//!
//! This module defines the trait the engine dispatches through, the chat
//! message and completion types shared across providers, and the error
//! taxonomy the retry policy consumes.
//!
//! Error classification happens exactly once, at the network boundary:
//! every failure a provider can produce is mapped into a [`ProviderError`]
//! variant here, so downstream policy code matches on tags instead of
//! inspecting runtime types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

mod openai;
pub mod secrets;

pub use openai::{OpenAiProvider, DEFAULT_ENDPOINT, OPENAI_API_KEY_ENV};
pub use secrets::{ApiCredential, CredentialSource};

/// Errors from completion providers.
///
/// Variants are the single source of truth for retry classification:
/// [`ProviderError::Retryable`] is the only variant the status-aware
/// resend layer acts on; everything else is terminal for that layer.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Connection-level failure before a response was received.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The connection or body stream was interrupted mid-response.
    #[error("stream reset while reading response: {0}")]
    StreamReset(String),

    /// A status the server asks us to retry: 429, 500, 503, or 504.
    #[error("retryable status {status}, retry after {retry_after:?}")]
    Retryable {
        status: u16,
        retry_after: Option<Duration>,
    },

    /// Any other non-2xx status. Not resent by the status-aware layer.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The response body did not match the expected completion schema.
    #[error("response parse error: {0}")]
    Parse(String),

    /// The overall request deadline elapsed.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// Missing credentials or endpoint configuration.
    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

/// Configuration for a single completion request.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// Model identifier sent in the request body
    pub model: String,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// Overall request timeout (connect + read)
    pub timeout: Duration,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens: 650,
            temperature: 0.8,
            timeout: Duration::from_secs(30),
        }
    }
}

/// A chat message for the completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role: "system", "user", or "assistant"
    pub role: String,

    /// Message content
    pub content: String,
}

impl ChatMessage {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Response from a completion request.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Generated content of the first choice
    pub content: String,

    /// Model that produced the response
    pub model: String,
}

/// Provider abstraction allows swapping completion backends.
///
/// The engine only ever talks to the network through this trait, which is
/// also the seam the integration tests mock.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Execute a single-turn chat completion.
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Release pooled connections.
    ///
    /// Providers that hold a connection pool drop it here; a later call to
    /// [`CompletionProvider::complete`] re-acquires the pool lazily, so a
    /// closed provider remains usable.
    async fn close(&self) {}

    /// Provider name for logging.
    fn name(&self) -> &str;
}
