use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use floodgate::config::{FloodgateConfig, StoreBackend};
use floodgate::http::HttpServer;
use floodgate::ratelimit::{CounterStore, FailurePolicy, MemoryStore, RateLimiter, RedisStore};

/// Fixed-window HTTP rate limiter backed by a shared counter store.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP listen address
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Redis connection URL
    #[arg(long)]
    redis_url: Option<String>,

    /// Requests admitted per client per window
    #[arg(long)]
    limit: Option<u64>,

    /// Window length in seconds
    #[arg(long)]
    window_secs: Option<u64>,

    /// Decision when the counter store fails
    #[arg(long, value_parser = parse_failure_policy)]
    failure_policy: Option<FailurePolicy>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

fn parse_failure_policy(value: &str) -> Result<FailurePolicy, String> {
    match value {
        "closed" => Ok(FailurePolicy::Closed),
        "open" => Ok(FailurePolicy::Open),
        other => Err(format!("expected `closed` or `open`, got `{other}`")),
    }
}

impl Args {
    fn apply(&self, config: &mut FloodgateConfig) {
        if let Some(listen) = self.listen {
            config.server.listen_addr = listen;
        }
        if let Some(url) = &self.redis_url {
            config.store.redis_url = url.clone();
        }
        if let Some(limit) = self.limit {
            config.rate_limiting.limit = limit;
        }
        if let Some(window_secs) = self.window_secs {
            config.rate_limiting.window_secs = window_secs;
        }
        if let Some(policy) = self.failure_policy {
            config.rate_limiting.failure_policy = policy;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    }

    info!("Starting Floodgate Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = FloodgateConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;
    info!(
        listen_addr = %config.server.listen_addr,
        limit = config.rate_limiting.limit,
        window_secs = config.rate_limiting.window_secs,
        failure_policy = ?config.rate_limiting.failure_policy,
        expiry_mode = ?config.rate_limiting.expiry_mode,
        backend = ?config.store.backend,
        "Configuration loaded"
    );

    match config.store.backend {
        StoreBackend::Redis => {
            let store = RedisStore::connect(&config.store.redis_url).await?;
            run(Arc::new(store), &config).await?;
        }
        StoreBackend::Memory => {
            warn!("Using in-memory counter store; limits are not shared between instances");
            let store = Arc::new(MemoryStore::new());
            let purger = tokio::spawn(purge_expired(
                store.clone(),
                Duration::from_secs(config.store.purge_interval_secs),
            ));
            let result = run(store, &config).await;
            purger.abort();
            result?;
        }
    }

    info!("Floodgate Rate Limiting Service stopped");
    Ok(())
}

/// Build the rate limiter over `store` and serve until shutdown.
async fn run<S: CounterStore + 'static>(
    store: Arc<S>,
    config: &FloodgateConfig,
) -> anyhow::Result<()> {
    let settings = &config.rate_limiting;
    let mut rate_limiter = RateLimiter::new(store, settings.limit_config()?)
        .with_failure_policy(settings.failure_policy)
        .with_expiry_mode(settings.expiry_mode)
        .with_key_prefix(settings.key_prefix.clone());
    if let Some(timeout) = settings.store_timeout() {
        rate_limiter = rate_limiter.with_timeout(timeout);
    }
    info!("Rate limiter initialized");

    HttpServer::new(config.server.listen_addr, Arc::new(rate_limiter))
        .serve_with_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Periodically drop expired counters from the in-memory store.
async fn purge_expired(store: Arc<MemoryStore>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let purged = store.purge_expired();
        if purged > 0 {
            debug!(purged = purged, remaining = store.len(), "Purged expired counters");
        }
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
