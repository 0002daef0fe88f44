//! # scribe-engine
//!
//! Concurrent, rate-limited LLM summarization engine.
//!
//! Turns a batch of prompts (source files or free-form instructions) into
//! natural-language summaries by calling a chat-completion endpoint,
//! while enforcing a shared request-rate budget, retrying transient
//! failures, and deduplicating repeated prompts through a TTL cache.
//!
//! ## Key Guarantees
//!
//! 1. **One result per input**: no job is ever dropped, and no single
//!    job's failure aborts a batch
//! 2. **Input-order results**: callers never observe completion order
//! 3. **Global rate budget**: dispatches across all concurrent jobs stay
//!    at least `1 / rate_limit` seconds apart, with at most `rate_limit`
//!    requests in flight
//! 4. **Contained failures**: per-job errors become error-text results;
//!    only engine misconfiguration fails a whole batch
//!
//! ## Example
//!
//! ```rust,ignore
//! use scribe_engine::{EngineConfig, SummaryEngine};
//!
//! let engine = SummaryEngine::new(EngineConfig::new("gpt-4o-mini"))?;
//!
//! let files = vec![("src/lib.rs".to_string(), contents)];
//! let results = engine.summarize_files(&files, "Summarize this file:\n{}").await;
//!
//! for result in results {
//!     println!("{}: {}", result.identifier, result.outcome.text());
//! }
//! engine.close().await;
//! ```
//!
//! ## Limitations
//!
//! There is no batch-level cancellation: once submitted, every job runs
//! to a terminal result. Callers needing early abort should drop the
//! whole engine instead.

pub mod cache;
pub mod config;
pub mod executor;
pub mod orchestrator;
pub mod provider;
pub mod rate;
pub mod retry;
pub mod text;

// Re-export main types at crate root
pub use cache::ResponseCache;
pub use config::{CacheConfig, ConfigError, EngineConfig};
pub use executor::{Job, JobKind, RequestExecutor, SummaryOutcome, SummaryResult, SYSTEM_PERSONA};
pub use orchestrator::{EngineError, SummaryEngine, SummaryEngineBuilder};
pub use provider::{
    ChatMessage, CompletionConfig, CompletionProvider, CompletionResponse, OpenAiProvider,
    ProviderError,
};
pub use rate::{RateBudget, RatePermit};
pub use retry::{RetryConfig, RetryDecision, RetryPolicy};
