//! Core rate limiter implementation.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::store::{CounterStore, ExpiryMode, StoreError, MAX_TTL};
use crate::error::{FloodgateError, Result};

/// Default number of requests admitted per window.
pub const DEFAULT_LIMIT: u64 = 10;
/// Default window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);
/// Default namespace prepended to client keys in the store.
pub const DEFAULT_KEY_PREFIX: &str = "ratelimit:";

/// Configuration for a rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitConfig {
    /// Maximum requests admitted in the time window
    limit: u64,
    /// Length of the time window
    window: Duration,
}

impl LimitConfig {
    /// Create a limit, rejecting a zero limit, an empty window, or a window
    /// longer than the stores can expire.
    pub fn new(limit: u64, window: Duration) -> Result<Self> {
        if limit == 0 {
            return Err(FloodgateError::Config(
                "limit must be greater than zero".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(FloodgateError::Config(
                "window must be greater than zero".to_string(),
            ));
        }
        if window > MAX_TTL {
            return Err(FloodgateError::Config(format!(
                "window must be at most {} seconds",
                MAX_TTL.as_secs()
            )));
        }
        Ok(Self { limit, window })
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            window: DEFAULT_WINDOW,
        }
    }
}

/// What to do with a request when the counter store cannot be reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Deny the request.
    #[default]
    Closed,
    /// Admit the request.
    Open,
}

/// Outcome of a single rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The post-increment count is within the limit.
    Allowed { count: u64 },
    /// The post-increment count exceeds the limit.
    Denied { count: u64 },
    /// The store call failed or timed out; nothing was counted.
    StoreFailure,
}

/// The rate limiter.
///
/// Holds no mutable state of its own: every counter lives in the store, whose
/// atomic increment-and-expire is the only synchronization between concurrent
/// checks. Safe to share across tasks behind an `Arc`.
pub struct RateLimiter<S: CounterStore> {
    store: Arc<S>,
    config: LimitConfig,
    failure_policy: FailurePolicy,
    expiry_mode: ExpiryMode,
    /// Deadline for a single store call
    timeout: Option<Duration>,
    key_prefix: String,
}

impl<S: CounterStore> RateLimiter<S> {
    /// Create a fail-closed rate limiter that re-arms the window on every request.
    pub fn new(store: Arc<S>, config: LimitConfig) -> Self {
        Self {
            store,
            config,
            failure_policy: FailurePolicy::default(),
            expiry_mode: ExpiryMode::default(),
            timeout: None,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_expiry_mode(mut self, mode: ExpiryMode) -> Self {
        self.expiry_mode = mode;
        self
    }

    /// Bound each store call; a call that overruns counts as a store failure.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn config(&self) -> LimitConfig {
        self.config
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Decide whether a request from `key` is admitted.
    ///
    /// Store failures are absorbed here and resolved by the failure policy.
    pub async fn allow(&self, key: &str) -> bool {
        match self.check(key).await {
            Decision::Allowed { .. } => true,
            Decision::Denied { .. } => false,
            Decision::StoreFailure => self.failure_policy == FailurePolicy::Open,
        }
    }

    /// Count a request from `key` and report how it compares to the limit.
    pub async fn check(&self, key: &str) -> Decision {
        let store_key = format!("{}{}", self.key_prefix, key);

        trace!(key = %store_key, "Checking rate limit");

        let result = match self.timeout {
            Some(deadline) => tokio::time::timeout(
                deadline,
                self.store
                    .increment_and_expire(&store_key, self.config.window, self.expiry_mode),
            )
            .await
            .unwrap_or_else(|_| Err(StoreError::Timeout(deadline))),
            None => {
                self.store
                    .increment_and_expire(&store_key, self.config.window, self.expiry_mode)
                    .await
            }
        };

        match result {
            Ok(count) if count <= self.config.limit => Decision::Allowed { count },
            Ok(count) => {
                debug!(
                    key = %store_key,
                    count = count,
                    limit = self.config.limit,
                    "Rate limit exceeded"
                );
                Decision::Denied { count }
            }
            Err(e) => {
                warn!(
                    key = %store_key,
                    error = %e,
                    policy = ?self.failure_policy,
                    "Counter store call failed"
                );
                Decision::StoreFailure
            }
        }
    }
}
