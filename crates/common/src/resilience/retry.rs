//! Retry with exponential backoff for transient failures.
//!
//! A [`RetryPolicy`] classifies each error; the [`RetryExecutor`] drives the
//! attempt loop, sleeping between attempts per the configured backoff. When
//! every attempt fails the caller gets the last error back unchanged, so
//! error context built up by the operation survives the retry layer.

use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{ConfigError, ConfigResult};

/// Decision returned by a [`RetryPolicy`] after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the configured backoff delay.
    Retry,
    /// Retry after a specific delay, overriding the backoff schedule.
    RetryAfter(Duration),
    /// Give up and surface the error.
    Stop,
}

/// Classifies errors as retryable or terminal.
pub trait RetryPolicy<E> {
    /// Decide what to do about `error`; `attempt` counts prior failures,
    /// starting at 0 for the first.
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries allowed after the first attempt; 0 disables retrying.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Create a new configuration builder.
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.base_delay.is_zero() {
            return Err(ConfigError::invalid("base_delay must be greater than zero"));
        }
        if self.max_delay < self.base_delay {
            return Err(ConfigError::invalid("max_delay must not be less than base_delay"));
        }
        Ok(())
    }

    /// Backoff delay before retry number `retry` (1-indexed).
    ///
    /// The delay doubles per retry starting from `base_delay` and is capped
    /// at `max_delay`.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let doublings = retry.saturating_sub(1);
        let mut delay = self.base_delay;
        for _ in 0..doublings {
            if delay >= self.max_delay {
                break;
            }
            delay = delay.saturating_mul(2);
        }
        delay.min(self.max_delay)
    }
}

/// Builder for [`RetryConfig`].
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self { config: RetryConfig::default() }
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.max_delay = delay;
        self
    }

    pub fn build(self) -> ConfigResult<RetryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Drives an async operation through the retry loop.
///
/// # Examples
///
/// ```rust
/// use portico_common::resilience::{policies, RetryConfig, RetryExecutor};
///
/// # async fn example() -> Result<(), &'static str> {
/// let executor = RetryExecutor::new(RetryConfig::default(), policies::AlwaysRetry);
///
/// let value = executor
///     .execute(|| async { Ok::<_, &'static str>(42) })
///     .await?;
/// assert_eq!(value, 42);
/// # Ok(())
/// # }
/// ```
pub struct RetryExecutor<P> {
    config: RetryConfig,
    policy: P,
}

impl<P> RetryExecutor<P> {
    /// Create a new executor from a config and a policy.
    pub fn new(config: RetryConfig, policy: P) -> Self {
        Self { config, policy }
    }

    /// The configured retry parameters.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation`, retrying failures the policy allows.
    ///
    /// At most `max_retries + 1` attempts are made. The policy is only
    /// consulted while attempts remain; once they are exhausted, or the
    /// policy says [`RetryDecision::Stop`], the most recent error is
    /// returned as-is.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        P: RetryPolicy<E>,
        E: Debug,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.config.max_retries.saturating_add(1);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "operation succeeded after retrying");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if attempt >= max_attempts {
                        warn!(attempt, error = ?error, "retry attempts exhausted");
                        return Err(error);
                    }

                    let delay = match self.policy.should_retry(&error, attempt - 1) {
                        RetryDecision::Stop => {
                            debug!(attempt, error = ?error, "error is terminal, not retrying");
                            return Err(error);
                        }
                        RetryDecision::Retry => self.config.backoff_delay(attempt),
                        RetryDecision::RetryAfter(delay) => delay,
                    };

                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = ?error,
                        "attempt failed, backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Ready-made policies for common cases.
pub mod policies {
    use super::{RetryDecision, RetryPolicy};

    /// Retries every error.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct AlwaysRetry;

    impl<E> RetryPolicy<E> for AlwaysRetry {
        fn should_retry(&self, _error: &E, _attempt: u32) -> RetryDecision {
            RetryDecision::Retry
        }
    }

    /// Never retries; the first error is final.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct NeverRetry;

    impl<E> RetryPolicy<E> for NeverRetry {
        fn should_retry(&self, _error: &E, _attempt: u32) -> RetryDecision {
            RetryDecision::Stop
        }
    }
}
