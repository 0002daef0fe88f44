//! Per-job request execution.
//!
//! The executor drives one prompt through the full pipeline: cache
//! lookup, rate-budget acquisition, the network call, retry handling, and
//! cache population. Failures never escape: every job ends in a
//! [`SummaryResult`], error or success.

use backon::Retryable;
use std::sync::Arc;
use tokio::time::sleep;

use crate::cache::ResponseCache;
use crate::config::EngineConfig;
use crate::provider::{ChatMessage, CompletionConfig, CompletionProvider, ProviderError};
use crate::rate::RateBudget;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::text::format_sentence;

/// System persona framing every completion request.
pub const SYSTEM_PERSONA: &str = "You are a brilliant technical lead.";

/// Kind of work a job represents.
///
/// Affects only which token budget the orchestrator assigns; the wire
/// protocol is identical for both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Summarize one source file
    FileSummary,

    /// Answer a free-form prompt
    FreeformPrompt,
}

/// One unit of work: a prompt plus the caller's correlation key.
#[derive(Debug, Clone)]
pub struct Job {
    /// Caller-supplied key (file path or 1-based position), unique within
    /// a batch
    pub identifier: String,

    /// Fully rendered prompt text
    pub prompt: String,

    /// What the prompt asks for
    pub kind: JobKind,

    /// Maximum tokens the model may generate for this job
    pub token_budget: u32,
}

/// Outcome of one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryOutcome {
    /// A genuine model-generated summary
    Generated(String),

    /// A human-readable description of why the job failed
    Failed(String),
}

impl SummaryOutcome {
    /// The summary or error text.
    pub fn text(&self) -> &str {
        match self {
            SummaryOutcome::Generated(text) | SummaryOutcome::Failed(text) => text,
        }
    }

    /// Whether this outcome is an error placeholder.
    pub fn is_failure(&self) -> bool {
        matches!(self, SummaryOutcome::Failed(_))
    }
}

/// The `(identifier, text)` pair produced for every submitted job.
#[derive(Debug, Clone)]
pub struct SummaryResult {
    /// The job's correlation key
    pub identifier: String,

    /// Summary or error text
    pub outcome: SummaryOutcome,
}

impl SummaryResult {
    fn generated(identifier: String, text: String) -> Self {
        Self {
            identifier,
            outcome: SummaryOutcome::Generated(text),
        }
    }

    pub(crate) fn failed(identifier: String, reason: String) -> Self {
        Self {
            identifier,
            outcome: SummaryOutcome::Failed(reason),
        }
    }
}

/// Executes one job end to end.
///
/// Shared state (budget, cache) arrives through `Arc`s; the executor
/// itself holds no per-job mutable state and can be driven by any number
/// of concurrent callers.
pub struct RequestExecutor {
    provider: Arc<dyn CompletionProvider>,
    budget: Arc<RateBudget>,
    cache: Arc<ResponseCache>,
    policy: RetryPolicy,
    model: String,
    temperature: f32,
    timeout: std::time::Duration,
}

impl RequestExecutor {
    /// Create an executor over shared budget and cache.
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        budget: Arc<RateBudget>,
        cache: Arc<ResponseCache>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            provider,
            budget,
            cache,
            policy: RetryPolicy::new(config.retry.clone()),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout: config.request_timeout,
        }
    }

    /// Drive one job to a terminal result.
    ///
    /// Never returns an error and never panics on provider failures; the
    /// worst case is a [`SummaryOutcome::Failed`] carrying a description
    /// of what went wrong.
    pub async fn execute(&self, job: Job) -> SummaryResult {
        if let Some(cached) = self.cache.get(&job.prompt).await {
            tracing::debug!(identifier = %job.identifier, "cache hit, skipping network call");
            return SummaryResult::generated(job.identifier, cached);
        }

        let attempt = || async { self.attempt(&job).await };
        let outcome = attempt
            .retry(self.policy.backoff())
            // API errors with a non-retryable status are terminal; the
            // backoff net catches everything else.
            .when(|err| {
                !matches!(
                    err,
                    ProviderError::Api { .. } | ProviderError::NotConfigured(_)
                )
            })
            .notify(|err, delay| {
                tracing::warn!(error = %err, backoff = ?delay, "attempt failed, backing off");
            })
            .await;

        match outcome {
            Ok(raw) => {
                let summary = format_sentence(&raw);
                tracing::info!(identifier = %job.identifier, "summary generated");
                self.cache
                    .insert(job.prompt.clone(), summary.clone())
                    .await;
                SummaryResult::generated(job.identifier, summary)
            }
            Err(err) => {
                tracing::error!(identifier = %job.identifier, error = %err, "job failed terminally");
                let reason = format!("request for `{}` failed: {}", job.identifier, err);
                SummaryResult::failed(job.identifier, reason)
            }
        }
    }

    /// One generic-layer attempt: a dispatch plus at most one
    /// status-aware delayed resend.
    ///
    /// The resend re-enters from budget acquisition and does not consume
    /// a generic attempt. The cache is not rechecked here; the prompt is
    /// already known to require a live call.
    async fn attempt(&self, job: &Job) -> Result<String, ProviderError> {
        match self.dispatch(job).await {
            Err(err) => match self.policy.classify(&err) {
                RetryDecision::ResendAfter(delay) => {
                    tracing::warn!(
                        identifier = %job.identifier,
                        error = %err,
                        delay = ?delay,
                        "server asked for a delayed resend"
                    );
                    sleep(delay).await;
                    self.dispatch(job).await
                }
                RetryDecision::Fatal => Err(err),
            },
            ok => ok,
        }
    }

    /// One rate-budgeted network call.
    ///
    /// The permit guard drops on every exit path, releasing the in-flight
    /// slot and stamping the dispatch timestamp whether the call
    /// succeeded or not.
    async fn dispatch(&self, job: &Job) -> Result<String, ProviderError> {
        let _permit = self.budget.acquire().await;

        let messages = vec![
            ChatMessage::system(SYSTEM_PERSONA),
            ChatMessage::user(job.prompt.clone()),
        ];
        let config = CompletionConfig {
            model: self.model.clone(),
            max_tokens: job.token_budget,
            temperature: self.temperature,
            timeout: self.timeout,
        };

        let response = self.provider.complete(messages, &config).await?;
        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::time::Instant;

    use crate::provider::CompletionResponse;

    /// Provider that plays back a script of responses and records when
    /// each call arrived.
    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<String, ProviderError>>>,
        call_times: Mutex<Vec<Instant>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<String, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                call_times: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.call_times.lock().len()
        }

        fn call_times(&self) -> Vec<Instant> {
            self.call_times.lock().clone()
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        async fn complete(
            &self,
            _messages: Vec<ChatMessage>,
            config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            self.call_times.lock().push(Instant::now());
            match self.script.lock().pop_front() {
                Some(Ok(content)) => Ok(CompletionResponse {
                    content,
                    model: config.model.clone(),
                }),
                Some(Err(err)) => Err(err),
                None => Ok(CompletionResponse {
                    content: "default summary".to_string(),
                    model: config.model.clone(),
                }),
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn executor(provider: Arc<ScriptedProvider>, config: &EngineConfig) -> RequestExecutor {
        RequestExecutor::new(
            provider,
            Arc::new(RateBudget::new(config.rate_limit)),
            Arc::new(ResponseCache::new(
                config.cache.max_entries,
                config.cache.ttl,
            )),
            config,
        )
    }

    fn job(prompt: &str) -> Job {
        Job {
            identifier: "src/lib.rs".to_string(),
            prompt: prompt.to_string(),
            kind: JobKind::FileSummary,
            token_budget: 650,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_normalizes_and_caches() {
        let config = EngineConfig::default();
        let provider = ScriptedProvider::new(vec![Ok("  A   raw\nsummary ".to_string())]);
        let executor = executor(Arc::clone(&provider), &config);

        let result = executor.execute(job("summarize lib.rs")).await;
        assert!(!result.outcome.is_failure());
        assert_eq!(result.outcome.text(), "A raw summary.");

        // Second identical prompt hits the cache, no new network call.
        let again = executor.execute(job("summarize lib.rs")).await;
        assert_eq!(again.outcome.text(), "A raw summary.");
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_causes_exactly_one_resend() {
        let config = EngineConfig::default();
        let provider = ScriptedProvider::new(vec![
            Err(ProviderError::Retryable {
                status: 429,
                retry_after: Some(Duration::from_secs(2)),
            }),
            Ok("Recovered summary.".to_string()),
        ]);
        let executor = executor(Arc::clone(&provider), &config);

        let result = executor.execute(job("summarize")).await;
        assert_eq!(result.outcome.text(), "Recovered summary.");
        assert_eq!(provider.calls(), 2, "expected exactly one resend");

        let times = provider.call_times();
        assert!(
            times[1] - times[0] >= Duration::from_secs(2),
            "resend arrived only {:?} after the 429",
            times[1] - times[0]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_retry_after_defaults_to_ten_seconds() {
        let config = EngineConfig::default();
        let provider = ScriptedProvider::new(vec![
            Err(ProviderError::Retryable {
                status: 503,
                retry_after: None,
            }),
            Ok("ok".to_string()),
        ]);
        let executor = executor(Arc::clone(&provider), &config);

        executor.execute(job("summarize")).await;
        let times = provider.call_times();
        assert!(times[1] - times[0] >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failures_exhaust_generic_retries() {
        let config = EngineConfig::default();
        let provider = ScriptedProvider::new(vec![
            Err(ProviderError::Transport("connection refused".to_string())),
            Err(ProviderError::Transport("connection refused".to_string())),
            Err(ProviderError::Transport("connection refused".to_string())),
        ]);
        let executor = executor(Arc::clone(&provider), &config);

        let result = executor.execute(job("summarize")).await;
        assert!(result.outcome.is_failure());
        assert!(result.outcome.text().contains("src/lib.rs"));
        assert_eq!(provider.calls(), 3, "generic layer allows 3 attempts total");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_status_is_not_retried() {
        let config = EngineConfig::default();
        let provider = ScriptedProvider::new(vec![Err(ProviderError::Api {
            status: 401,
            message: "invalid key".to_string(),
        })]);
        let executor = executor(Arc::clone(&provider), &config);

        let result = executor.execute(job("summarize")).await;
        assert!(result.outcome.is_failure());
        assert!(result.outcome.text().contains("401"));
        assert_eq!(provider.calls(), 1, "non-retryable status must not be retried");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_jobs_are_not_cached() {
        let config = EngineConfig::default();
        let provider = ScriptedProvider::new(vec![
            Err(ProviderError::Api {
                status: 400,
                message: "bad request".to_string(),
            }),
            Ok("Second time works.".to_string()),
        ]);
        let executor = executor(Arc::clone(&provider), &config);

        let first = executor.execute(job("summarize")).await;
        assert!(first.outcome.is_failure());

        let second = executor.execute(job("summarize")).await;
        assert_eq!(second.outcome.text(), "Second time works.");
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_reset_is_retried_generically() {
        let config = EngineConfig::default();
        let provider = ScriptedProvider::new(vec![
            Err(ProviderError::StreamReset(
                "connection reset by peer".to_string(),
            )),
            Ok("After the reset.".to_string()),
        ]);
        let executor = executor(Arc::clone(&provider), &config);

        let result = executor.execute(job("summarize")).await;
        assert_eq!(result.outcome.text(), "After the reset.");
        assert_eq!(provider.calls(), 2);
    }
}
