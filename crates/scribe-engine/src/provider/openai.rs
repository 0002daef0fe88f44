//! OpenAI-compatible chat-completions provider.
//!
//! Speaks the `/chat/completions` wire format: bearer-token auth, a JSON
//! body with the message list, model, temperature, and max_tokens, and a
//! response whose first choice carries the generated text. Any endpoint
//! implementing that shape works here.
//!
//! ## Security
//!
//! The API key is held in an [`ApiCredential`] and only exposed at the
//! point the authorization header is built.

use super::{
    secrets::{ApiCredential, CredentialSource},
    ChatMessage, CompletionConfig, CompletionProvider, CompletionResponse, ProviderError,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable name for the API key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Default chat-completions endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Statuses the server asks us to retry after a delay.
const RETRYABLE_STATUSES: [u16; 4] = [429, 500, 503, 504];

/// OpenAI-compatible completion provider.
///
/// The pooled HTTP client is built lazily on first use and dropped by
/// [`CompletionProvider::close`]; a closed provider re-acquires the pool
/// on the next call, so engines can be reused after shutdown.
pub struct OpenAiProvider {
    credential: ApiCredential,
    endpoint: String,
    client: Mutex<Option<reqwest::Client>>,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("credential", &self.credential)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl OpenAiProvider {
    /// Create a new provider with an explicit API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            credential: ApiCredential::new(api_key, CredentialSource::Programmatic, "API key"),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            client: Mutex::new(None),
        }
    }

    /// Create from the `OPENAI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self, ProviderError> {
        let credential = ApiCredential::from_env(OPENAI_API_KEY_ENV, "API key")?;
        Ok(Self {
            credential,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            client: Mutex::new(None),
        })
    }

    /// Set a custom endpoint URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Get the pooled client, building it lazily if absent.
    fn client(&self) -> reqwest::Client {
        let mut guard = self.client.lock();
        guard
            .get_or_insert_with(|| {
                reqwest::Client::builder()
                    .timeout(Duration::from_secs(30))
                    .pool_max_idle_per_host(10)
                    .build()
                    .expect("Failed to build HTTP client")
            })
            .clone()
    }

    #[cfg(test)]
    fn has_client(&self) -> bool {
        self.client.lock().is_some()
    }
}

/// Chat-completions request body.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    messages: &'a [ChatMessage],
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
}

/// Chat-completions response body.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Error envelope some endpoints return on non-2xx.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Read the `Retry-After` header as whole seconds, if present.
///
/// The HTTP-date form of the header is intentionally unsupported; a
/// non-numeric value yields `None` and the retry policy falls back to
/// its default delay.
fn retry_after_header(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Extract a human-readable message from a non-2xx body.
fn error_message(body: &[u8]) -> String {
    if let Ok(envelope) = serde_json::from_slice::<ApiErrorBody>(body) {
        return envelope.error.message;
    }
    String::from_utf8_lossy(body).trim().to_string()
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        if self.credential.is_empty() {
            return Err(ProviderError::NotConfigured(
                "API key is empty".to_string(),
            ));
        }

        let request = ChatCompletionRequest {
            messages: &messages,
            model: &config.model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        };

        // Credential exposed only here, at the point of use.
        let response = self
            .client()
            .post(&self.endpoint)
            .bearer_auth(self.credential.expose())
            .timeout(config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(config.timeout)
                } else {
                    ProviderError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let headers = response.headers().clone();

        // Body errors after headers arrived are stream interruptions, not
        // connection failures.
        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(config.timeout)
            } else {
                ProviderError::StreamReset(e.to_string())
            }
        })?;

        if RETRYABLE_STATUSES.contains(&status.as_u16()) {
            return Err(ProviderError::Retryable {
                status: status.as_u16(),
                retry_after: retry_after_header(&headers),
            });
        }

        if !status.is_success() {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let parsed: ChatCompletionResponse =
            serde_json::from_slice(&body).map_err(|e| ProviderError::Parse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                ProviderError::Parse("response contained no generated message".to_string())
            })?;

        Ok(CompletionResponse {
            content,
            model: parsed.model.unwrap_or_else(|| config.model.clone()),
        })
    }

    async fn close(&self) {
        // Dropping the client releases its connection pool. The next call
        // to complete() rebuilds it lazily.
        *self.client.lock() = None;
    }

    fn name(&self) -> &str {
        "openai"
    }
}
