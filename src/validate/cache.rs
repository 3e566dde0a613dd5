//! Decision cache: per-domain verdicts with a fixed time-to-live.
//!
//! Entries expire passively (moka measures age on a monotonic clock). A miss
//! runs the decision chain once per domain even under concurrent requests.

use crate::validate::types::Verdict;
use moka::future::Cache;
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_CAPACITY: u64 = 100_000;

pub struct DecisionCache {
    entries: Cache<String, Verdict>,
    ttl: Duration,
}

impl DecisionCache {
    pub fn new(ttl: Duration, capacity: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();
        Self { entries, ttl }
    }

    pub async fn get(&self, domain: &str) -> Option<Verdict> {
        self.entries.get(domain).await
    }

    /// Return the cached verdict, or run `decide` and cache its result.
    /// The flag is true when the verdict came from the cache.
    pub async fn get_or_decide<F>(&self, domain: &str, decide: F) -> (Verdict, bool)
    where
        F: Future<Output = Verdict>,
    {
        let entry = self
            .entries
            .entry_by_ref(domain)
            .or_insert_with(decide)
            .await;
        let cached = !entry.is_fresh();
        (entry.into_value(), cached)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of live entries, after pending maintenance has run.
    pub async fn len(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }
}

impl Default for DecisionCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_CAPACITY)
    }
}
