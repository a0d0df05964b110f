//! Foundation primitives shared across Portico crates.
//!
//! Pure building blocks with no HTTP awareness: a bounded TTL/LRU cache and
//! the resilience toolkit (rate limiting, retry, deadlines, clock
//! abstraction). The gateway crate composes these into its request pipeline;
//! nothing here knows about requests, endpoints or status codes.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod cache;
pub mod error;
pub mod resilience;

// Re-export commonly used types and traits for convenience
// ------------------------
pub use cache::{Cache, CacheConfig, CacheConfigBuilder, CacheStats};
pub use error::{ConfigError, ConfigResult};
pub use resilience::{
    policies, with_deadline, Acquisition, Clock, DeadlineElapsed, MockClock, RetryConfig,
    RetryConfigBuilder, RetryDecision, RetryExecutor, RetryPolicy, SystemClock, TokenBucket,
    TokenBucketConfig, TokenBucketConfigBuilder,
};
