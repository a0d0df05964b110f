//! Resilient client for a public open-data HTTP portal.
//!
//! The portal is rate-limited, occasionally slow and occasionally down, so
//! every read goes through one pipeline:
//!
//! 1. **Rate limit**: a token-bucket token is paid per call, before anything
//!    else, so cached reads count against the portal budget too.
//! 2. **Cache**: responses are cached under deterministic keys with TTL
//!    expiry and LRU eviction; a hit ends the pipeline here.
//! 3. **Fetch**: misses go to the network with a hard per-attempt deadline,
//!    a byte cap enforced while the body streams, and exponential-backoff
//!    retry for transient failures (HTTP 429/5xx and transport errors).
//! 4. **Decode**: the JSON lands in the cache, then deserializes into the
//!    caller's type.
//!
//! Clients targeting the same portal share one [`GatewayResources`] so the
//! rate limit and cache apply globally.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

mod body;
pub mod client;
pub mod config;
pub mod error;
pub mod request;
pub mod telemetry;

pub use client::{GatewayClient, GatewayResources, ResponseCache};
pub use config::{GatewayConfig, GatewayConfigBuilder};
pub use error::{GatewayError, Result};
// The stats type returned by `GatewayClient::cache_stats`.
pub use portico_common::cache::CacheStats;
pub use request::{ParamValue, Params, RequestDescriptor};
pub use telemetry::{LogSink, NoopSink, TelemetrySink};
