//! Configuration management for Floodgate.
//!
//! Configuration is read once at startup from an optional YAML file and
//! `FLOODGATE_`-prefixed environment variables (nested keys separated by `__`,
//! e.g. `FLOODGATE_RATE_LIMITING__LIMIT=100`). It is never reloaded.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{FloodgateError, Result};
use crate::ratelimit::{
    ExpiryMode, FailurePolicy, LimitConfig, DEFAULT_KEY_PREFIX, DEFAULT_LIMIT, DEFAULT_WINDOW,
};

/// Main configuration for the Floodgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FloodgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Counter store configuration
    #[serde(default)]
    pub store: StoreConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Requests admitted per client per window
    #[serde(default = "default_limit")]
    pub limit: u64,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Decision when the counter store fails
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Whether each request re-arms the window or only the first one sets it
    #[serde(default)]
    pub expiry_mode: ExpiryMode,

    /// Deadline for a single store call in milliseconds; unbounded if unset
    #[serde(default)]
    pub store_timeout_ms: Option<u64>,

    /// Namespace prepended to client keys in the store
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            window_secs: default_window_secs(),
            failure_policy: FailurePolicy::default(),
            expiry_mode: ExpiryMode::default(),
            store_timeout_ms: None,
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_limit() -> u64 {
    DEFAULT_LIMIT
}

fn default_window_secs() -> u64 {
    DEFAULT_WINDOW.as_secs()
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

impl RateLimitingConfig {
    /// Build the validated limit for the rate limiter.
    pub fn limit_config(&self) -> Result<LimitConfig> {
        LimitConfig::new(self.limit, Duration::from_secs(self.window_secs))
    }

    pub fn store_timeout(&self) -> Option<Duration> {
        self.store_timeout_ms.map(Duration::from_millis)
    }
}

/// Which counter store backs the rate limiter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Shared Redis server
    #[default]
    Redis,
    /// Process memory; counters are not shared between instances
    Memory,
}

/// Counter store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// How often expired in-memory counters are purged, in seconds
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis_url: default_redis_url(),
            purge_interval_secs: default_purge_interval(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_purge_interval() -> u64 {
    60
}

impl FloodgateConfig {
    /// Load configuration from an optional file plus the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder
            .add_source(
                config::Environment::with_prefix("FLOODGATE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize::<FloodgateConfig>())
            .map_err(|e| FloodgateError::Config(e.to_string()))
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| FloodgateError::Config(e.to_string()))
    }

    /// Check values that the type system cannot.
    pub fn validate(&self) -> Result<()> {
        self.rate_limiting.limit_config()?;
        if self.store.purge_interval_secs == 0 {
            return Err(FloodgateError::Config(
                "store.purge_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.rate_limiting.store_timeout_ms == Some(0) {
            return Err(FloodgateError::Config(
                "rate_limiting.store_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = FloodgateConfig::default();

        assert_eq!(config.server.listen_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.rate_limiting.limit, 10);
        assert_eq!(config.rate_limiting.window_secs, 60);
        assert_eq!(config.rate_limiting.failure_policy, FailurePolicy::Closed);
        assert_eq!(config.rate_limiting.expiry_mode, ExpiryMode::Rearm);
        assert_eq!(config.rate_limiting.store_timeout(), None);
        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.store.redis_url, "redis://127.0.0.1:6379");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_match_limiter_defaults() {
        let config = FloodgateConfig::default();
        let limit = config.rate_limiting.limit_config().unwrap();

        assert_eq!(limit, LimitConfig::default());
        assert_eq!(
            FloodgateConfig::from_yaml("{}").unwrap().rate_limiting.limit_config().unwrap(),
            LimitConfig::default()
        );
    }

    #[test]
    fn test_load_from_environment() {
        // Keys not touched by the file-based test, which loads concurrently
        std::env::set_var("FLOODGATE_RATE_LIMITING__WINDOW_SECS", "7");
        std::env::set_var("FLOODGATE_STORE__REDIS_URL", "redis://cache.internal:6380");
        std::env::set_var("FLOODGATE_STORE__BACKEND", "memory");

        let result = FloodgateConfig::load(None);

        std::env::remove_var("FLOODGATE_RATE_LIMITING__WINDOW_SECS");
        std::env::remove_var("FLOODGATE_STORE__REDIS_URL");
        std::env::remove_var("FLOODGATE_STORE__BACKEND");

        let config = result.unwrap();
        assert_eq!(config.rate_limiting.window_secs, 7);
        assert_eq!(config.store.redis_url, "redis://cache.internal:6380");
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.server.listen_addr, default_listen_addr());
    }

    #[test]
    fn test_validate_rejects_over_long_window() {
        let mut config = FloodgateConfig::default();
        config.rate_limiting.window_secs = u64::MAX;
        assert!(matches!(config.validate(), Err(FloodgateError::Config(_))));
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
rate_limiting:
  limit: 100
  failure_policy: open
  store_timeout_ms: 250
store:
  backend: memory
"#;
        let config = FloodgateConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.rate_limiting.limit, 100);
        assert_eq!(config.rate_limiting.window_secs, 60);
        assert_eq!(config.rate_limiting.failure_policy, FailurePolicy::Open);
        assert_eq!(
            config.rate_limiting.store_timeout(),
            Some(Duration::from_millis(250))
        );
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.server.listen_addr, default_listen_addr());
    }

    #[test]
    fn test_parse_expiry_mode() {
        let config = FloodgateConfig::from_yaml("rate_limiting:\n  expiry_mode: fixed\n").unwrap();
        assert_eq!(config.rate_limiting.expiry_mode, ExpiryMode::Fixed);
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let result = FloodgateConfig::from_yaml("rate_limiting:\n  limit: lots\n");
        assert!(matches!(result, Err(FloodgateError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_limit() {
        let mut config = FloodgateConfig::default();
        config.rate_limiting.limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut config = FloodgateConfig::default();
        config.rate_limiting.window_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = FloodgateConfig::default();
        config.rate_limiting.store_timeout_ms = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("floodgate-config-{}.yaml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "server:\n  listen_addr: 127.0.0.1:9000\nrate_limiting:\n  limit: 3").unwrap();
        drop(file);

        let config = FloodgateConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.server.listen_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.rate_limiting.limit, 3);
    }
}
