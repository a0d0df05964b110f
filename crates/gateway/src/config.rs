//! Gateway configuration: builder, validation and environment loading.
//!
//! Configuration is immutable once built. Validation happens in
//! [`GatewayConfigBuilder::build`], so an invalid setup fails before the
//! first request instead of misbehaving at runtime.

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::{GatewayError, Result};

/// `User-Agent` sent with every request.
pub(crate) const DEFAULT_USER_AGENT: &str =
    concat!("portico-gateway/", env!("CARGO_PKG_VERSION"));

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(900);
const DEFAULT_MAX_CACHE_SIZE: usize = 100;
const DEFAULT_MAX_RESPONSE_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_RATE_TOKENS: u64 = 5;
const DEFAULT_RATE_INTERVAL: Duration = Duration::from_secs(1);

/// Immutable configuration for a gateway client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Upstream root. Always ends in `/` so endpoint joins resolve under it
    /// instead of replacing its last path segment.
    pub base_url: Url,
    /// Product identifier sent as the `User-Agent` header.
    pub user_agent: String,
    /// Hard time budget for each request attempt.
    pub timeout: Duration,
    /// Master switch for retrying transient failures.
    pub enable_retry: bool,
    /// Retries after the first attempt; ignored while retry is disabled.
    pub max_retries: u32,
    /// Backoff delay before the first retry; doubles per further retry.
    pub base_delay: Duration,
    /// Upper bound on any single backoff delay.
    pub max_delay: Duration,
    /// How long cached responses stay fresh.
    pub cache_ttl: Duration,
    /// Bound on cached entries before LRU eviction.
    pub max_cache_size: usize,
    /// Bound on response body bytes buffered in memory.
    pub max_response_bytes: u64,
    /// Rate limiter bucket capacity, restored once per `rate_interval`.
    pub rate_tokens: u64,
    /// Refill interval of the rate limiter.
    pub rate_interval: Duration,
}

impl GatewayConfig {
    /// Start building a configuration for the portal at `base_url`.
    pub fn builder(base_url: impl Into<String>) -> GatewayConfigBuilder {
        GatewayConfigBuilder::new(base_url)
    }

    /// Load configuration from `PORTICO_*` environment variables.
    ///
    /// `PORTICO_BASE_URL` is required; every other variable falls back to
    /// its default when unset. Durations are read as integer milliseconds.
    ///
    /// | Variable | Meaning |
    /// |----------|---------|
    /// | `PORTICO_BASE_URL` | Upstream root URL (required) |
    /// | `PORTICO_TIMEOUT_MS` | Per-attempt deadline |
    /// | `PORTICO_ENABLE_RETRY` | `true`/`false` master retry switch |
    /// | `PORTICO_MAX_RETRIES` | Retries after the first attempt |
    /// | `PORTICO_CACHE_TTL_MS` | Cached response freshness window |
    /// | `PORTICO_MAX_CACHE_SIZE` | Cache entry bound |
    /// | `PORTICO_MAX_RESPONSE_BYTES` | Response body byte cap |
    /// | `PORTICO_RATE_TOKENS` | Rate limiter bucket capacity |
    /// | `PORTICO_RATE_INTERVAL_MS` | Rate limiter refill interval |
    pub fn from_env() -> Result<Self> {
        let base_url = env::var("PORTICO_BASE_URL").map_err(|_| {
            GatewayError::configuration("missing required environment variable PORTICO_BASE_URL")
        })?;

        let mut builder = Self::builder(base_url);

        if let Some(timeout) = env_duration_ms("PORTICO_TIMEOUT_MS")? {
            builder = builder.timeout(timeout);
        }
        builder = builder.enable_retry(env_bool("PORTICO_ENABLE_RETRY", true));
        if let Some(retries) = env_parse::<u32>("PORTICO_MAX_RETRIES")? {
            builder = builder.max_retries(retries);
        }
        if let Some(ttl) = env_duration_ms("PORTICO_CACHE_TTL_MS")? {
            builder = builder.cache_ttl(ttl);
        }
        if let Some(size) = env_parse::<usize>("PORTICO_MAX_CACHE_SIZE")? {
            builder = builder.max_cache_size(size);
        }
        if let Some(bytes) = env_parse::<u64>("PORTICO_MAX_RESPONSE_BYTES")? {
            builder = builder.max_response_bytes(bytes);
        }
        if let Some(tokens) = env_parse::<u64>("PORTICO_RATE_TOKENS")? {
            builder = builder.rate_tokens(tokens);
        }
        if let Some(interval) = env_duration_ms("PORTICO_RATE_INTERVAL_MS")? {
            builder = builder.rate_interval(interval);
        }

        builder.build()
    }

    /// Retries the pipeline actually performs: `max_retries` when retry is
    /// enabled, 0 otherwise.
    pub fn effective_max_retries(&self) -> u32 {
        if self.enable_retry {
            self.max_retries
        } else {
            0
        }
    }
}

/// Builder for [`GatewayConfig`] with a fluent API.
#[derive(Debug)]
pub struct GatewayConfigBuilder {
    base_url: String,
    user_agent: String,
    timeout: Duration,
    enable_retry: bool,
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    cache_ttl: Duration,
    max_cache_size: usize,
    max_response_bytes: u64,
    rate_tokens: u64,
    rate_interval: Duration,
}

impl GatewayConfigBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            enable_retry: true,
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            cache_ttl: DEFAULT_CACHE_TTL,
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            rate_tokens: DEFAULT_RATE_TOKENS,
            rate_interval: DEFAULT_RATE_INTERVAL,
        }
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn enable_retry(mut self, enabled: bool) -> Self {
        self.enable_retry = enabled;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn max_cache_size(mut self, size: usize) -> Self {
        self.max_cache_size = size;
        self
    }

    pub fn max_response_bytes(mut self, bytes: u64) -> Self {
        self.max_response_bytes = bytes;
        self
    }

    pub fn rate_tokens(mut self, tokens: u64) -> Self {
        self.rate_tokens = tokens;
        self
    }

    pub fn rate_interval(mut self, interval: Duration) -> Self {
        self.rate_interval = interval;
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<GatewayConfig> {
        let mut base_url = Url::parse(&self.base_url).map_err(|err| {
            GatewayError::configuration(format!("invalid base URL '{}': {err}", self.base_url))
        })?;

        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(GatewayError::configuration(format!(
                "base URL scheme must be http or https, got '{}'",
                base_url.scheme()
            )));
        }

        // Joining relative endpoints replaces the last path segment unless
        // the base path ends with a slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        if self.user_agent.trim().is_empty() {
            return Err(GatewayError::configuration("user_agent must not be empty"));
        }
        if self.timeout.is_zero() {
            return Err(GatewayError::configuration("timeout must be greater than zero"));
        }
        if self.base_delay.is_zero() {
            return Err(GatewayError::configuration("base_delay must be greater than zero"));
        }
        if self.max_delay < self.base_delay {
            return Err(GatewayError::configuration(
                "max_delay must not be less than base_delay",
            ));
        }
        if self.cache_ttl.is_zero() {
            return Err(GatewayError::configuration("cache_ttl must be greater than zero"));
        }
        if self.max_cache_size == 0 {
            return Err(GatewayError::configuration("max_cache_size must be at least 1"));
        }
        if self.max_response_bytes == 0 {
            return Err(GatewayError::configuration(
                "max_response_bytes must be at least 1",
            ));
        }
        if self.rate_tokens == 0 {
            return Err(GatewayError::configuration("rate_tokens must be at least 1"));
        }
        if self.rate_interval.is_zero() {
            return Err(GatewayError::configuration("rate_interval must be greater than zero"));
        }

        Ok(GatewayConfig {
            base_url,
            user_agent: self.user_agent,
            timeout: self.timeout,
            enable_retry: self.enable_retry,
            max_retries: self.max_retries,
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            cache_ttl: self.cache_ttl,
            max_cache_size: self.max_cache_size,
            max_response_bytes: self.max_response_bytes,
            rate_tokens: self.rate_tokens,
            rate_interval: self.rate_interval,
        })
    }
}

/// Parse an environment variable; unset is `None`, unparseable is an error.
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|err| GatewayError::configuration(format!("invalid value for {key}: {err}"))),
        Err(_) => Ok(None),
    }
}

fn env_duration_ms(key: &str) -> Result<Option<Duration>> {
    Ok(env_parse::<u64>(key)?.map(Duration::from_millis))
}

/// Read a boolean flag; accepts `1`/`true`/`yes`/`on`, anything else is
/// false, unset falls back to `default`.
fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|raw| matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
