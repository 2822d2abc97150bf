//! Redis-backed counter store.
//!
//! Counters live in a shared Redis (or wire-compatible) server so that every
//! instance of the service sees the same count for a client. Each increment is
//! sent as a single `MULTI`/`EXEC` transaction holding `INCR` and `PEXPIRE`.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{debug, info, warn};

use super::store::{CounterStore, ExpiryMode, StoreError, MAX_TTL};

/// Counter store backed by a Redis connection manager.
///
/// The connection manager multiplexes one connection and reconnects on its own;
/// it is cloned per call and needs no further coordination.
#[derive(Clone)]
pub struct RedisStore {
    connection_manager: ConnectionManager,
}

impl RedisStore {
    /// Connect to the store at `url` and verify it answers `PING`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(|e| {
            warn!(error = %e, "Failed to create Redis client");
            StoreError::Redis(e)
        })?;

        let connection_manager = ConnectionManager::new(client).await.map_err(|e| {
            warn!(error = %e, "Failed to create Redis connection manager");
            StoreError::Redis(e)
        })?;

        let mut conn = connection_manager.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        if pong != "PONG" {
            return Err(StoreError::UnexpectedReply(pong));
        }

        info!(url = %url, "Connected to Redis counter store");

        Ok(Self { connection_manager })
    }
}

/// Convert an expiry to the millisecond argument of `PEXPIRE`.
///
/// Redis queues an out-of-range `PEXPIRE` and only fails it at `EXEC`, after
/// the `INCR` has already applied, so the range is checked before sending.
fn ttl_millis(ttl: Duration) -> Result<i64, StoreError> {
    if ttl > MAX_TTL {
        return Err(StoreError::InvalidTtl(ttl));
    }
    let ms = i64::try_from(ttl.as_millis()).map_err(|_| StoreError::InvalidTtl(ttl))?;
    // PEXPIRE 0 deletes the key, so never send less than one millisecond
    Ok(ms.max(1))
}

/// Build the transaction that increments `key` and applies its expiry.
pub(crate) fn increment_pipeline(
    key: &str,
    ttl: Duration,
    mode: ExpiryMode,
) -> Result<redis::Pipeline, StoreError> {
    let ttl_ms = ttl_millis(ttl)?;

    let mut pipe = redis::pipe();
    pipe.atomic().cmd("INCR").arg(key);
    pipe.cmd("PEXPIRE").arg(key).arg(ttl_ms);
    if mode == ExpiryMode::Fixed {
        pipe.arg("NX");
    }
    pipe.ignore();
    Ok(pipe)
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn increment_and_expire(
        &self,
        key: &str,
        ttl: Duration,
        mode: ExpiryMode,
    ) -> Result<u64, StoreError> {
        let mut conn = self.connection_manager.clone();

        let (count,): (u64,) = increment_pipeline(key, ttl, mode)?
            .query_async(&mut conn)
            .await?;

        debug!(key = %key, count = count, "Incremented Redis counter");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packed(pipe: &redis::Pipeline) -> String {
        String::from_utf8_lossy(&pipe.get_packed_pipeline()).into_owned()
    }

    #[test]
    fn test_pipeline_is_a_transaction() {
        let pipe = increment_pipeline("ratelimit:10.0.0.1", Duration::from_secs(60), ExpiryMode::Rearm).unwrap();
        let wire = packed(&pipe);

        let multi = wire.find("MULTI").unwrap();
        let incr = wire.find("INCR").unwrap();
        let pexpire = wire.find("PEXPIRE").unwrap();
        let exec = wire.find("EXEC").unwrap();
        assert!(multi < incr && incr < pexpire && pexpire < exec);
        assert!(wire.contains("60000"));
        assert!(!wire.contains("NX"));
    }

    #[test]
    fn test_fixed_mode_only_sets_missing_expiry() {
        let pipe = increment_pipeline("k", Duration::from_secs(1), ExpiryMode::Fixed).unwrap();
        let wire = packed(&pipe);

        assert!(wire.contains("PEXPIRE"));
        assert!(wire.contains("NX"));
    }

    #[test]
    fn test_sub_millisecond_ttl_is_rounded_up() {
        let pipe = increment_pipeline("k", Duration::from_micros(10), ExpiryMode::Rearm).unwrap();
        let wire = packed(&pipe);

        assert!(wire.contains("PEXPIRE\r\n$1\r\nk\r\n$1\r\n1\r\n"));
    }

    #[test]
    fn test_over_long_ttl_is_rejected_before_sending() {
        let result = increment_pipeline("k", MAX_TTL + Duration::from_secs(1), ExpiryMode::Rearm);
        assert!(matches!(result, Err(StoreError::InvalidTtl(_))));

        let result = increment_pipeline("k", Duration::from_secs(u64::MAX), ExpiryMode::Fixed);
        assert!(matches!(result, Err(StoreError::InvalidTtl(_))));

        assert_eq!(ttl_millis(MAX_TTL).unwrap(), 315_360_000_000);
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server at REDIS_URL"]
    async fn test_redis_round_trip() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let store = RedisStore::connect(&url).await.unwrap();
        let key = format!("floodgate-test:{}", std::process::id());
        let ttl = Duration::from_secs(5);

        let first = store.increment_and_expire(&key, ttl, ExpiryMode::Rearm).await.unwrap();
        let second = store.increment_and_expire(&key, ttl, ExpiryMode::Rearm).await.unwrap();
        assert_eq!(second, first + 1);

        let mut conn = store.connection_manager.clone();
        let pttl: i64 = redis::cmd("PTTL").arg(&key).query_async(&mut conn).await.unwrap();
        assert!(pttl > 0 && pttl <= 5000);
    }
}
