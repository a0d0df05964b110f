//! Resilience primitives for calling over an unreliable network.
//!
//! Four building blocks, each usable on its own:
//! - **Rate limiting** ([`rate_limit`]): token bucket with continuous refill
//! - **Retry** ([`retry`]): policy-driven retry with exponential backoff
//! - **Deadlines** ([`deadline`]): hard per-operation time budgets
//! - **Clock** ([`clock`]): time source abstraction so the above are testable
//!
//! All of them are generic over error and clock types and carry no knowledge
//! of any particular protocol; the gateway crate composes them into its
//! request pipeline.

pub mod clock;
pub mod deadline;
pub mod rate_limit;
pub mod retry;

pub use clock::{Clock, MockClock, SystemClock};
pub use deadline::{with_deadline, DeadlineElapsed};
pub use rate_limit::{Acquisition, TokenBucket, TokenBucketConfig, TokenBucketConfigBuilder};
pub use retry::{
    policies, RetryConfig, RetryConfigBuilder, RetryDecision, RetryExecutor, RetryPolicy,
};
