//! Response cache keyed by exact prompt text.
//!
//! Deduplicates network calls for repeated prompts. Entries expire after
//! a fixed TTL, which keeps staleness bounded: a hit is only acceptable
//! because the entry is recent enough to stand in for a live call.

use moka::future::Cache;
use std::time::Duration;

/// TTL + capacity bounded memo of prompt text to summary text.
///
/// Keys are case- and whitespace-sensitive: two prompts must be
/// byte-identical to share an entry. Safe under concurrent access with
/// no external locking.
///
/// At capacity, moka's TinyLFU policy chooses the victim; entries are
/// not strictly evicted oldest-first. The TTL still bounds how long any
/// entry can live, so staleness is capped either way.
pub struct ResponseCache {
    cache: Cache<String, String>,
}

impl ResponseCache {
    /// Create a cache holding at most `max_entries`, each expiring
    /// `ttl` after insertion.
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    /// Look up a cached summary. Expired entries are misses.
    pub async fn get(&self, prompt: &str) -> Option<String> {
        self.cache.get(prompt).await
    }

    /// Insert or refresh an entry.
    pub async fn insert(&self, prompt: String, summary: String) {
        self.cache.insert(prompt, summary).await;
    }

    /// Drop all entries.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Number of live entries (approximate until pending tasks settle).
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(500, Duration::from_secs(600))
    }
}
