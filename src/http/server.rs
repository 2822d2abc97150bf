//! HTTP server implementation.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{http::StatusCode, middleware, routing::any, Router};
use tokio::net::TcpListener;
use tracing::{error, info};

use super::middleware::rate_limit_middleware;
use crate::error::{FloodgateError, Result};
use crate::ratelimit::{CounterStore, RateLimiter};

/// Build the application router with the rate limit layer in front of every route.
pub fn build_router<S: CounterStore + 'static>(rate_limiter: Arc<RateLimiter<S>>) -> Router {
    Router::new()
        .route("/api", any(api_handler))
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware::<S>,
        ))
}

async fn api_handler() -> StatusCode {
    info!("Request received");
    StatusCode::OK
}

/// HTTP server for the rate limited API.
pub struct HttpServer<S: CounterStore + 'static> {
    /// Address to bind to
    addr: SocketAddr,
    /// The rate limiter instance
    rate_limiter: Arc<RateLimiter<S>>,
}

impl<S: CounterStore + 'static> HttpServer<S> {
    pub fn new(addr: SocketAddr, rate_limiter: Arc<RateLimiter<S>>) -> Self {
        Self { addr, rate_limiter }
    }

    pub fn router(&self) -> Router {
        build_router(self.rate_limiter.clone())
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves. Failing to
    /// bind the listen address is returned as an I/O error.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            FloodgateError::Io(e)
        })?;

        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "Starting HTTP server with graceful shutdown");

        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            FloodgateError::Io(e)
        })
    }
}
