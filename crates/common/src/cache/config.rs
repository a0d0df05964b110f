//! Cache configuration and its builder.
//!
//! Every cache is bounded and every entry expires: `max_size` and `ttl` are
//! both required, so a misconfigured cache fails at construction instead of
//! growing without limit at runtime.

use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};

/// Configuration for cache behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries before least-recently-used eviction.
    pub max_size: usize,

    /// Time-to-live for entries.
    pub ttl: Duration,

    /// Whether a read renews the entry's expiry (sliding TTL). When false
    /// entries expire a fixed `ttl` after insertion no matter how often they
    /// are read.
    pub refresh_on_read: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            ttl: Duration::from_secs(900),
            refresh_on_read: true,
        }
    }
}

impl CacheConfig {
    /// Create a new configuration builder.
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_size == 0 {
            return Err(ConfigError::invalid("max_size must be at least 1"));
        }
        if self.ttl.is_zero() {
            return Err(ConfigError::invalid("ttl must be greater than zero"));
        }
        Ok(())
    }
}

/// Builder for [`CacheConfig`] with a fluent API.
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of entries.
    pub fn max_size(mut self, size: usize) -> Self {
        self.config.max_size = size;
        self
    }

    /// Set the time-to-live for entries.
    pub fn ttl(mut self, duration: Duration) -> Self {
        self.config.ttl = duration;
        self
    }

    /// Enable or disable sliding TTL renewal on reads.
    pub fn refresh_on_read(mut self, enabled: bool) -> Self {
        self.config.refresh_on_read = enabled;
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> ConfigResult<CacheConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
