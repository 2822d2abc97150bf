//! Floodgate - Fixed-Window HTTP Rate Limiting
//!
//! This crate bounds how many requests each client address may issue within a
//! fixed window. Counters live in a shared store (Redis in production) and are
//! incremented and expired in one atomic transaction, so every instance of the
//! service enforces the same limit without in-process coordination.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
