//! Error taxonomy for gateway calls.
//!
//! Every variant names the endpoint it happened on, and each maps onto one
//! cause the caller can act on. Retryability lives here rather than in the
//! retry layer so the classification is testable on its own.

use std::time::Duration;

use portico_common::ConfigError;
use thiserror::Error;

/// Result alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors surfaced by gateway calls.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The per-attempt time budget elapsed. The attempt was aborted and is
    /// never retried.
    #[error("request to '{endpoint}' exceeded its {timeout:?} deadline")]
    DeadlineExceeded { endpoint: String, timeout: Duration },

    /// The response was, or declared itself to be, larger than the configured
    /// byte cap. `declared` carries the Content-Length when the rejection
    /// happened before the body was read.
    #[error("response from '{endpoint}' exceeded the {limit} byte limit")]
    PayloadTooLarge { endpoint: String, limit: u64, declared: Option<u64> },

    /// The upstream answered with a non-success HTTP status.
    #[error("upstream returned HTTP {status} for '{endpoint}'")]
    Upstream { endpoint: String, status: u16 },

    /// A network-level failure with no HTTP status: refused connection,
    /// reset, DNS failure.
    #[error("transport failure for '{endpoint}'")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The response body was not valid JSON or did not match the requested
    /// type.
    #[error("failed to decode response from '{endpoint}'")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    /// Invalid construction-time parameters; raised before any request is
    /// made.
    #[error("invalid gateway configuration: {message}")]
    Configuration { message: String },
}

impl GatewayError {
    /// Whether resubmitting the same request could plausibly succeed.
    ///
    /// Rate limiting (429) and server errors (5xx) are transient upstream
    /// conditions, and transport failures are assumed transient. Everything
    /// else fails the same way on a resend: other client errors, size
    /// rejections, decode failures and elapsed deadlines.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream { status, .. } => *status == 429 || (500..=599).contains(status),
            Self::Transport { .. } => true,
            _ => false,
        }
    }

    /// The HTTP status associated with the failure, when one exists.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            Self::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// The endpoint the failure happened on, when the error carries one.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Self::DeadlineExceeded { endpoint, .. }
            | Self::PayloadTooLarge { endpoint, .. }
            | Self::Upstream { endpoint, .. }
            | Self::Transport { endpoint, .. }
            | Self::Decode { endpoint, .. } => Some(endpoint),
            Self::Configuration { .. } => None,
        }
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }
}

impl From<ConfigError> for GatewayError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration { message: err.to_string() }
    }
}
