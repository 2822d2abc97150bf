//! Counter store trait for abstracting the networked and in-memory backends.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while talking to a counter store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Store call exceeded deadline of {0:?}")]
    Timeout(Duration),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Unexpected store reply: {0}")]
    UnexpectedReply(String),
    #[error("Expiry of {0:?} is longer than the ten year maximum")]
    InvalidTtl(Duration),
}

/// Longest expiry a store accepts (ten years).
pub const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// How a counter's expiry is applied on each increment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpiryMode {
    /// Reset the expiry to the full window on every increment.
    ///
    /// Continuously active keys never see their counter expire, so the limit
    /// acts as a cap for as long as traffic keeps arriving within one window.
    #[default]
    Rearm,
    /// Set the expiry only when the counter is created.
    Fixed,
}

/// Trait for counter store implementations.
///
/// Implementations must apply the increment and the expiry as a single
/// all-or-nothing unit: either both take effect or neither does.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment the counter for `key` by one and apply `ttl` according to
    /// `mode`, returning the post-increment value.
    async fn increment_and_expire(
        &self,
        key: &str,
        ttl: Duration,
        mode: ExpiryMode,
    ) -> Result<u64, StoreError>;
}
