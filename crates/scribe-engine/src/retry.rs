//! Retry policy for failed completion attempts.
//!
//! Two layers, kept deliberately distinct:
//!
//! 1. **Status-aware resend** — [`RetryPolicy::classify`] maps a
//!    [`ProviderError`] to a decision. Only the statuses the server asks
//!    us to retry (429/500/503/504) earn a single delayed resend, waiting
//!    out the `Retry-After` header (default 10 s when absent).
//! 2. **Generic bounded backoff** — [`RetryPolicy::backoff`] builds the
//!    exponential schedule (3 attempts total, 4 s doubling to a 10 s cap)
//!    applied to *any* error as a blunt safety net around layer 1.
//!
//! The layers compose in sequence; one generic attempt wraps at most one
//! status-aware resend, and the resend never consumes a generic attempt.

use backon::ExponentialBuilder;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::duration_str;
use crate::provider::ProviderError;

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts in the generic layer (first try included)
    pub max_attempts: u32,

    /// First backoff delay in the generic layer
    #[serde(with = "duration_str")]
    pub min_backoff: Duration,

    /// Backoff cap in the generic layer
    #[serde(with = "duration_str")]
    pub max_backoff: Duration,

    /// Resend delay when a retryable status carries no Retry-After header
    #[serde(with = "duration_str")]
    pub default_retry_after: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_backoff: Duration::from_secs(4),
            max_backoff: Duration::from_secs(10),
            default_retry_after: Duration::from_secs(10),
        }
    }
}

/// What to do with one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Suspend for the given delay, then resend the same job once.
    ResendAfter(Duration),

    /// Terminal for the status-aware layer. The generic backoff layer may
    /// still retry the whole attempt while under its ceiling.
    Fatal,
}

/// Classifies attempt failures and owns the backoff schedule.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a policy from configuration.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Classify one attempt's error.
    ///
    /// Only [`ProviderError::Retryable`] earns a delayed resend; transport
    /// failures, stream resets, timeouts, parse errors, and non-retryable
    /// statuses are all fatal at this layer.
    pub fn classify(&self, error: &ProviderError) -> RetryDecision {
        match error {
            ProviderError::Retryable { retry_after, .. } => {
                RetryDecision::ResendAfter(retry_after.unwrap_or(self.config.default_retry_after))
            }
            _ => RetryDecision::Fatal,
        }
    }

    /// Backoff schedule for the generic layer.
    ///
    /// `max_times` counts retries, so attempts = `max_attempts` total.
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.config.min_backoff)
            .with_max_delay(self.config.max_backoff)
            .with_factor(2.0)
            .with_max_times(self.config.max_attempts.saturating_sub(1) as usize)
    }

    /// Total attempts the generic layer allows.
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }
}
