//! Batch orchestration: fan prompts out, fan results back in order.
//!
//! The engine launches every job concurrently and guarantees the caller
//! observes input order, never completion order:
//! - [`SummaryEngine::summarize_files`] collects via an order-preserving
//!   `join_all`;
//! - [`SummaryEngine::summarize_prompts`] harvests in completion order
//!   through `FuturesUnordered`, then re-sorts by original position.
//!
//! Both entry points produce exactly one result per input and contain
//! every per-job failure; only engine-level misconfiguration fails a
//! batch, and that is caught when the engine is built.

use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use thiserror::Error;

use crate::cache::ResponseCache;
use crate::config::{ConfigError, EngineConfig};
use crate::executor::{Job, JobKind, RequestExecutor, SummaryResult};
use crate::provider::{CompletionProvider, OpenAiProvider, ProviderError};
use crate::rate::RateBudget;
use crate::text::{derive_token_budget, render_template, word_count};

/// Errors that fail an entire engine, not a single job.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("provider not configured: {0}")]
    Provider(#[from] ProviderError),
}

/// Fan-out/fan-in coordinator over a shared rate budget and cache.
///
/// Construct once per process via [`SummaryEngineBuilder`]; all batches
/// submitted to the same engine share one rate budget, so the spacing
/// invariant holds globally.
pub struct SummaryEngine {
    executor: RequestExecutor,
    provider: Arc<dyn CompletionProvider>,
    config: EngineConfig,
}

impl SummaryEngine {
    /// Shortcut: build from config with the default provider from env.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        SummaryEngineBuilder::new().config(config).build()
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Summarize a batch of files.
    ///
    /// `files` is an ordered list of `(identifier, contents)`; the
    /// template's `{}` placeholder receives each file's contents. Results
    /// come back in the same order the inputs were iterated, regardless
    /// of completion timing.
    ///
    /// A rendered prompt whose word count exceeds the configured maximum
    /// is rejected up front: no cache lookup, no budget acquisition, no
    /// network call, just a failed result naming the count.
    pub async fn summarize_files(
        &self,
        files: &[(String, String)],
        template: &str,
    ) -> Vec<SummaryResult> {
        let tasks = files.iter().map(|(identifier, contents)| {
            let prompt = render_template(template, contents);
            async move {
                let words = word_count(&prompt);
                if words > self.config.max_prompt_words as usize {
                    tracing::warn!(
                        identifier = %identifier,
                        words,
                        limit = self.config.max_prompt_words,
                        "prompt exceeds word limit, skipping"
                    );
                    return SummaryResult::failed(
                        identifier.clone(),
                        format!(
                            "prompt exceeds word limit: {} words (limit {})",
                            words, self.config.max_prompt_words
                        ),
                    );
                }

                self.executor
                    .execute(Job {
                        identifier: identifier.clone(),
                        prompt,
                        kind: JobKind::FileSummary,
                        token_budget: self.config.max_tokens,
                    })
                    .await
            }
        });

        // join_all polls all jobs concurrently and yields input order.
        join_all(tasks).await
    }

    /// Summarize an ordered list of free-form prompts.
    ///
    /// Identifiers are 1-based positions. Each job's token budget is
    /// derived from its prompt's length; shorter prompts may generate
    /// more. Jobs are harvested as they complete, then re-sorted so the
    /// returned sequence always matches input order.
    pub async fn summarize_prompts(&self, prompts: &[String]) -> Vec<SummaryResult> {
        let mut pending: FuturesUnordered<_> = prompts
            .iter()
            .enumerate()
            .map(|(index, prompt)| async move {
                let job = Job {
                    identifier: (index + 1).to_string(),
                    prompt: prompt.clone(),
                    kind: JobKind::FreeformPrompt,
                    token_budget: derive_token_budget(
                        self.config.max_tokens,
                        self.config.max_prompt_words,
                        self.config.min_completion_tokens,
                        prompt,
                    ),
                };
                (index, self.executor.execute(job).await)
            })
            .collect();

        let mut harvested = Vec::with_capacity(prompts.len());
        while let Some(completed) = pending.next().await {
            harvested.push(completed);
        }

        harvested.sort_by_key(|(index, _)| *index);
        harvested.into_iter().map(|(_, result)| result).collect()
    }

    /// Release pooled connections.
    ///
    /// The engine stays usable: the provider re-acquires its pool lazily
    /// on the next batch.
    pub async fn close(&self) {
        self.provider.close().await;
    }
}

/// Builder for [`SummaryEngine`].
pub struct SummaryEngineBuilder {
    provider: Option<Arc<dyn CompletionProvider>>,
    config: EngineConfig,
}

impl SummaryEngineBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            provider: None,
            config: EngineConfig::default(),
        }
    }

    /// Set the completion provider.
    pub fn provider(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set the configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the engine.
    ///
    /// Validates the configuration and, when no provider was injected,
    /// constructs the default OpenAI-compatible provider from the
    /// environment. Missing credentials fail here, before any job runs,
    /// since they would fail every job identically.
    pub fn build(self) -> Result<SummaryEngine, EngineError> {
        self.config.validate()?;

        let provider = match self.provider {
            Some(provider) => provider,
            None => Arc::new(
                OpenAiProvider::from_env()?.with_endpoint(self.config.endpoint.clone()),
            ),
        };

        let budget = Arc::new(RateBudget::new(self.config.rate_limit));
        let cache = Arc::new(ResponseCache::new(
            self.config.cache.max_entries,
            self.config.cache.ttl,
        ));
        let executor =
            RequestExecutor::new(Arc::clone(&provider), budget, cache, &self.config);

        Ok(SummaryEngine {
            executor,
            provider,
            config: self.config,
        })
    }
}

impl Default for SummaryEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
