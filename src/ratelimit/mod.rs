//! Rate limiting logic and counter stores.

mod limiter;
mod memory;
mod redis_store;
mod store;

pub use limiter::{
    Decision, FailurePolicy, LimitConfig, RateLimiter, DEFAULT_KEY_PREFIX, DEFAULT_LIMIT,
    DEFAULT_WINDOW,
};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use store::{CounterStore, ExpiryMode, StoreError, MAX_TTL};
