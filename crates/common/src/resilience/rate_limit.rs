//! Token bucket rate limiting for outbound request admission.
//!
//! The bucket refills continuously from elapsed monotonic time instead of a
//! background timer: every call recomputes the balance lazily, so an idle
//! bucket costs nothing and the limiter stays correct across arbitrary idle
//! periods. Callers either probe with [`TokenBucket::try_acquire`] or suspend
//! in [`TokenBucket::acquire`] until enough tokens have accrued.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::clock::{Clock, SystemClock};
use crate::error::{ConfigError, ConfigResult};

/// Configuration for the token bucket rate limiter.
///
/// The bucket holds at most `capacity` tokens and regains a full `capacity`
/// worth of tokens over each `refill_interval`, accruing fractionally in
/// between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBucketConfig {
    /// Maximum number of tokens the bucket can hold.
    pub capacity: u64,
    /// Time for an empty bucket to refill back to `capacity`.
    pub refill_interval: Duration,
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        Self { capacity: 5, refill_interval: Duration::from_secs(1) }
    }
}

impl TokenBucketConfig {
    /// Create a new configuration builder.
    pub fn builder() -> TokenBucketConfigBuilder {
        TokenBucketConfigBuilder::new()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.capacity == 0 {
            return Err(ConfigError::invalid("capacity must be greater than 0"));
        }
        if self.refill_interval.is_zero() {
            return Err(ConfigError::invalid("refill_interval must be greater than zero"));
        }
        Ok(())
    }
}

/// Builder for [`TokenBucketConfig`].
#[derive(Debug, Default)]
pub struct TokenBucketConfigBuilder {
    config: TokenBucketConfig,
}

impl TokenBucketConfigBuilder {
    pub fn new() -> Self {
        Self { config: TokenBucketConfig::default() }
    }

    pub fn capacity(mut self, capacity: u64) -> Self {
        self.config.capacity = capacity;
        self
    }

    pub fn refill_interval(mut self, interval: Duration) -> Self {
        self.config.refill_interval = interval;
        self
    }

    pub fn build(self) -> ConfigResult<TokenBucketConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Outcome of a [`TokenBucket::acquire`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquisition {
    /// Whether the requested tokens were granted.
    pub allowed: bool,
    /// How long to wait before enough tokens will have accrued; set on
    /// refusal so callers can schedule their own retry.
    pub retry_after: Option<Duration>,
    /// Whole tokens left in the bucket after the call.
    pub remaining: u64,
}

/// Mutable bucket state, guarded by a single mutex.
///
/// The refill, check and decrement all happen under one lock acquisition with
/// no await point inside, so concurrent acquirers can never spend the same
/// tokens twice. The lock is never held across `.await`.
#[derive(Debug)]
struct BucketState {
    /// Current balance; fractional because refill accrues continuously.
    /// Invariant: `0.0 <= tokens <= capacity`.
    tokens: f64,
    /// Monotonic instant of the last balance recomputation.
    last_refill: Instant,
}

/// Token bucket rate limiter with lazy, clock-driven refill.
///
/// Clones share the same underlying state, so one bucket can gate any number
/// of logical callers.
///
/// # Examples
///
/// ```rust
/// use portico_common::resilience::{TokenBucket, TokenBucketConfig};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bucket = TokenBucket::new(TokenBucketConfig::default())?;
///
/// if bucket.try_acquire(1) {
///     println!("request admitted");
/// } else {
///     println!("rate limit exceeded");
/// }
/// # Ok(())
/// # }
/// ```
pub struct TokenBucket<C: Clock = SystemClock> {
    config: TokenBucketConfig,
    state: Arc<Mutex<BucketState>>,
    clock: Arc<C>,
}

impl TokenBucket<SystemClock> {
    /// Create a new token bucket driven by the system clock.
    pub fn new(config: TokenBucketConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> TokenBucket<C> {
    /// Create a new token bucket with a custom clock (useful for testing).
    pub fn with_clock(config: TokenBucketConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;

        let state =
            BucketState { tokens: config.capacity as f64, last_refill: clock.now() };

        Ok(Self { config, state: Arc::new(Mutex::new(state)), clock: Arc::new(clock) })
    }

    /// Maximum number of tokens the bucket can hold.
    pub fn capacity(&self) -> u64 {
        self.config.capacity
    }

    /// Try to acquire `n` tokens without waiting.
    ///
    /// Returns `true` if the tokens were taken. On `false` the balance is
    /// left untouched apart from the refill.
    ///
    /// # Panics
    ///
    /// Panics if `n` is zero or exceeds the bucket capacity; both are
    /// programming errors in the caller, not runtime conditions.
    pub fn try_acquire(&self, n: u64) -> bool {
        self.assert_request(n);

        let mut state = self.lock_state();
        self.refill(&mut state);

        let needed = n as f64;
        if state.tokens >= needed {
            state.tokens -= needed;
            debug!(acquired = n, remaining = state.tokens.floor() as u64, "tokens acquired");
            true
        } else {
            debug!(requested = n, available = state.tokens.floor() as u64, "insufficient tokens");
            false
        }
    }

    /// Acquire `n` tokens, suspending until they accrue or `timeout` runs out.
    ///
    /// `None` waits as long as it takes. `Some(Duration::ZERO)` probes
    /// without suspending: with insufficient tokens it refuses immediately,
    /// reporting how long the caller would have had to wait in
    /// [`Acquisition::retry_after`]. Each wait sleeps exactly the computed
    /// deficit time and then re-checks; this is not a busy loop.
    ///
    /// # Panics
    ///
    /// Panics if `n` is zero or exceeds the bucket capacity.
    pub async fn acquire(&self, n: u64, timeout: Option<Duration>) -> Acquisition {
        self.assert_request(n);

        // A deadline too distant to represent degrades to unbounded waiting.
        let deadline = timeout.and_then(|t| self.clock.now().checked_add(t));
        let needed = n as f64;

        loop {
            let wait = {
                let mut state = self.lock_state();
                self.refill(&mut state);

                if state.tokens >= needed {
                    state.tokens -= needed;
                    let remaining = state.tokens.floor() as u64;
                    debug!(acquired = n, remaining, "tokens acquired");
                    return Acquisition { allowed: true, retry_after: None, remaining };
                }

                let deficit = needed - state.tokens;
                let wait = self.refill_wait(deficit);
                let now = self.clock.now();

                if let Some(deadline) = deadline {
                    let budget = deadline.saturating_duration_since(now);
                    if wait > budget {
                        let remaining = state.tokens.floor() as u64;
                        debug!(
                            requested = n,
                            retry_after_ms = wait.as_millis() as u64,
                            "acquire timed out waiting for refill"
                        );
                        return Acquisition {
                            allowed: false,
                            retry_after: Some(wait),
                            remaining,
                        };
                    }
                }

                wait
            };

            tokio::time::sleep(wait).await;
        }
    }

    /// Whole tokens currently available, after refill.
    pub fn available(&self) -> u64 {
        let mut state = self.lock_state();
        self.refill(&mut state);
        state.tokens.floor() as u64
    }

    /// Reset the bucket to full capacity.
    pub fn reset(&self) {
        let mut state = self.lock_state();
        state.tokens = self.config.capacity as f64;
        state.last_refill = self.clock.now();
    }

    /// Recompute the balance from time elapsed since the last refill.
    fn refill(&self, state: &mut BucketState) {
        let now = self.clock.now();
        let elapsed = now.duration_since(state.last_refill);

        if !elapsed.is_zero() {
            let rate = self.config.capacity as f64 / self.config.refill_interval.as_secs_f64();
            let replenished = state.tokens + elapsed.as_secs_f64() * rate;
            state.tokens = replenished.min(self.config.capacity as f64);
        }
        state.last_refill = now;
    }

    /// Time needed for `deficit` tokens to accrue at the configured rate.
    fn refill_wait(&self, deficit: f64) -> Duration {
        let secs = deficit * self.config.refill_interval.as_secs_f64()
            / self.config.capacity as f64;
        Duration::from_secs_f64(secs.max(0.0))
    }

    fn lock_state(&self) -> MutexGuard<'_, BucketState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                // Balance arithmetic cannot leave the state torn; recover.
                warn!("token bucket state lock poisoned");
                poisoned.into_inner()
            }
        }
    }

    fn assert_request(&self, n: u64) {
        assert!(n >= 1, "token request must be at least 1");
        assert!(
            n <= self.config.capacity,
            "token request {n} exceeds bucket capacity {}",
            self.config.capacity
        );
    }
}

impl<C: Clock> Clone for TokenBucket<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            clock: Arc::clone(&self.clock),
        }
    }
}
