//! Rate limit middleware.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use super::key::client_key;
use crate::ratelimit::{CounterStore, RateLimiter};

/// Admit or reject a request based on its client address.
///
/// Denied requests get `429 Too Many Requests` and never reach the inner
/// service. A request without connection info is keyed by the empty string
/// rather than failed. No `Retry-After` header is sent.
pub async fn rate_limit_middleware<S: CounterStore + 'static>(
    State(rate_limiter): State<Arc<RateLimiter<S>>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let key = connect_info
        .map(|ConnectInfo(addr)| client_key(&addr.to_string()))
        .unwrap_or_default();

    if !rate_limiter.allow(&key).await {
        debug!(
            client = %key,
            method = %request.method(),
            path = %request.uri().path(),
            "Rejecting rate limited request"
        );
        return (StatusCode::TOO_MANY_REQUESTS, "Too many requests").into_response();
    }

    next.run(request).await
}
