//! Operation timing reported to a pluggable sink.
//!
//! The gateway measures wall time for every call and hands the measurement
//! to a [`TelemetrySink`]; what happens to it (logging, aggregation,
//! export) is the embedder's business. The default sink logs through
//! `tracing`.

use std::fmt::Debug;
use std::time::Duration;

use tracing::debug;

/// Sink for per-call operation timings.
///
/// Each completed gateway call, success or failure, produces exactly one
/// report: the endpoint name and the total wall time including cache
/// lookups, waits and retries.
pub trait TelemetrySink: Send + Sync + Debug {
    /// Record one completed operation.
    fn record_operation(&self, operation: &str, duration: Duration);
}

/// Default sink that emits a structured tracing event per operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn record_operation(&self, operation: &str, duration: Duration) {
        debug!(operation, duration_ms = duration.as_millis() as u64, "gateway operation");
    }
}

/// Sink that drops every report, for callers without observability.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl TelemetrySink for NoopSink {
    fn record_operation(&self, _operation: &str, _duration: Duration) {}
}
