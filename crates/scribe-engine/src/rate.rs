//! Shared dispatch-rate budget.
//!
//! Two independent constraints, both enforced:
//!
//! 1. at most `rate_limit` requests in flight at once (semaphore permits)
//! 2. at least `1 / rate_limit` seconds between consecutive dispatches
//!    (shared timestamp)
//!
//! The budget is constructed once and shared by every job through an
//! `Arc`; it is never a free-floating global.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep, Instant};

/// Rate budget shared across all jobs in one engine.
pub struct RateBudget {
    semaphore: Arc<Semaphore>,
    last_dispatch: Mutex<Instant>,
    min_interval: std::time::Duration,
}

impl RateBudget {
    /// Create a budget allowing `rate_limit` requests per second.
    ///
    /// `rate_limit` also sizes the in-flight permit pool. A zero limit is
    /// clamped to one so the budget can always make progress.
    pub fn new(rate_limit: u32) -> Self {
        let limit = rate_limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit as usize)),
            last_dispatch: Mutex::new(Instant::now()),
            min_interval: std::time::Duration::from_secs_f64(1.0 / f64::from(limit)),
        }
    }

    /// Minimum spacing between consecutive dispatches.
    pub fn min_interval(&self) -> std::time::Duration {
        self.min_interval
    }

    /// Suspend until a permit is free and the spacing interval has
    /// elapsed, then claim a dispatch slot.
    ///
    /// The returned guard holds the permit until dropped, and stamps the
    /// shared timestamp again on drop so the budget reflects true request
    /// cadence even for failed calls. Waiters are admitted in semaphore
    /// order (FIFO).
    pub async fn acquire(self: &Arc<Self>) -> RatePermit {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("rate budget semaphore never closes");

        loop {
            let wait = {
                let mut last = self.last_dispatch.lock();
                let now = Instant::now();
                let next_allowed = *last + self.min_interval;
                if now >= next_allowed {
                    // Claim the slot while holding the lock so two waiters
                    // cannot both pass the spacing check.
                    *last = now;
                    None
                } else {
                    Some(next_allowed - now)
                }
            };

            match wait {
                None => {
                    return RatePermit {
                        _permit: permit,
                        budget: Arc::clone(self),
                    }
                }
                Some(delay) => sleep(delay).await,
            }
        }
    }

    /// Record a dispatch completing now.
    fn touch(&self) {
        *self.last_dispatch.lock() = Instant::now();
    }
}

/// RAII guard for one dispatch slot.
///
/// Dropping the guard releases the in-flight permit and updates the
/// shared dispatch timestamp, on every exit path.
pub struct RatePermit {
    _permit: OwnedSemaphorePermit,
    budget: Arc<RateBudget>,
}

impl Drop for RatePermit {
    fn drop(&mut self) {
        self.budget.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_dispatches_are_spaced() {
        let budget = Arc::new(RateBudget::new(2)); // 500ms spacing
        let start = Instant::now();

        let first = budget.acquire().await;
        let first_at = Instant::now() - start;
        drop(first);

        let second = budget.acquire().await;
        let second_at = Instant::now() - start;
        drop(second);

        assert!(
            second_at - first_at >= Duration::from_millis(500),
            "dispatches were {:?} apart",
            second_at - first_at
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_waiters_are_spaced() {
        let budget = Arc::new(RateBudget::new(4)); // 250ms spacing
        let times = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let budget = Arc::clone(&budget);
            let times = Arc::clone(&times);
            handles.push(tokio::spawn(async move {
                let permit = budget.acquire().await;
                times.lock().push(Instant::now());
                drop(permit);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut stamps = times.lock().clone();
        stamps.sort();
        for pair in stamps.windows(2) {
            assert!(
                pair[1] - pair[0] >= Duration::from_millis(250),
                "spacing violated: {:?}",
                pair[1] - pair[0]
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_permit_pool_bounds_in_flight() {
        let budget = Arc::new(RateBudget::new(1));

        let held = budget.acquire().await;

        // With the single permit held, a second acquire must not complete.
        let second = tokio::spawn({
            let budget = Arc::clone(&budget);
            async move {
                let _permit = budget.acquire().await;
            }
        });
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!second.is_finished(), "second acquire ran concurrently");

        drop(held);
        second.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_updates_timestamp() {
        let budget = Arc::new(RateBudget::new(1)); // 1s spacing

        let permit = budget.acquire().await;
        // Hold the permit across a long call, then release.
        tokio::time::sleep(Duration::from_secs(3)).await;
        drop(permit);

        let released_at = Instant::now();
        let _next = budget.acquire().await;
        // Spacing is measured from release, not from the first acquire.
        assert!(Instant::now() - released_at >= Duration::from_secs(1));
    }
}
