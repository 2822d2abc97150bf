//! In-process counter store.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::trace;

use super::store::{CounterStore, ExpiryMode, StoreError, MAX_TTL};

/// A single counter and its expiry deadline.
#[derive(Debug, Clone, Copy)]
struct Entry {
    count: u64,
    expires_at: Option<Instant>,
}

impl Entry {
    const EMPTY: Entry = Entry {
        count: 0,
        expires_at: None,
    };

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// A counter store held in process memory.
///
/// Each key's entry is updated under the map's shard lock, so the increment
/// and the expiry update are applied together and concurrent callers observe
/// a single serial order. Deadlines are measured with tokio's clock, which
/// lets tests pause and advance time.
#[derive(Debug, Default)]
pub struct MemoryStore {
    counters: DashMap<String, Entry>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the live count for a key, or `None` if it has no live counter.
    pub fn count(&self, key: &str) -> Option<u64> {
        let now = Instant::now();
        self.counters
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.count)
    }

    /// Get the remaining time-to-live of a live counter.
    pub fn time_to_live(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.counters
            .get(key)
            .filter(|e| !e.is_expired(now))
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Drop every counter whose expiry has passed.
    ///
    /// Returns the number of counters removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.counters.len();
        self.counters.retain(|_, e| !e.is_expired(now));
        before.saturating_sub(self.counters.len())
    }

    /// Number of counters currently held, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn increment_and_expire(
        &self,
        key: &str,
        ttl: Duration,
        mode: ExpiryMode,
    ) -> Result<u64, StoreError> {
        let now = Instant::now();
        let deadline = match now.checked_add(ttl) {
            Some(deadline) if ttl <= MAX_TTL => deadline,
            _ => return Err(StoreError::InvalidTtl(ttl)),
        };
        let mut entry = self.counters.entry(key.to_string()).or_insert(Entry::EMPTY);

        if entry.is_expired(now) {
            *entry = Entry::EMPTY;
        }

        entry.count += 1;
        match mode {
            ExpiryMode::Rearm => entry.expires_at = Some(deadline),
            ExpiryMode::Fixed => {
                if entry.expires_at.is_none() {
                    entry.expires_at = Some(deadline);
                }
            }
        }

        trace!(key = %key, count = entry.count, "Incremented in-memory counter");
        Ok(entry.count)
    }
}
