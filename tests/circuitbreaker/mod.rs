//! Circuit breaker behavior through the public API.
//!
//! - scenario.rs: opening on consecutive failures, rejection, reset
//! - half_open.rs: recovery trials and trial concurrency
//! - layer.rs: the Tower layer sharing a registry breaker

mod half_open;
mod scenario;
