//! HTTP surface: client key derivation, the rate limit middleware and the server.

mod key;
mod middleware;
mod server;

pub use key::client_key;
pub use middleware::rate_limit_middleware;
pub use server::{build_router, HttpServer};
