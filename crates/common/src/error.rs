//! Shared error types for the foundation crate.

use thiserror::Error;

/// Error returned when a configuration fails validation.
///
/// Every config type in this crate validates at construction time so that
/// invalid parameters surface before any request is made.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    /// Build an `Invalid` error from anything displayable.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid { message: message.into() }
    }
}

/// Result type for configuration validation.
pub type ConfigResult<T> = Result<T, ConfigError>;
