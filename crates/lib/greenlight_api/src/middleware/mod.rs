//! Request pipeline middleware, outermost first.
//!
//! - [`metrics`]: request and response counters.
//! - [`recover`]: converts handler panics into internal error responses.
//! - [`rate_limit`]: per-client token buckets keyed by peer address.
//! - [`auth`]: resolves the bearer token into an [`Identity`](greenlight_core::models::auth::Identity).
//! - [`authorize`]: per-route gate chains.

pub mod auth;
pub mod authorize;
pub mod metrics;
pub mod rate_limit;
pub mod recover;
