//! Hard time budgets for async operations.
//!
//! [`with_deadline`] races a future against a budget. When the budget elapses
//! the future is dropped, which cancels whatever I/O it owns, and the caller
//! gets a [`DeadlineElapsed`] instead of the operation's output. Retrying
//! callers wrap each attempt separately so every attempt gets a fresh window.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

/// Error returned when an operation outlives its time budget.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("operation '{operation}' exceeded its {budget:?} deadline")]
pub struct DeadlineElapsed {
    /// Name of the guarded operation, carried for logs and error context.
    pub operation: String,
    /// The budget that ran out.
    pub budget: Duration,
}

/// Run `future` under a hard deadline of `budget`.
///
/// On timeout the future is dropped before this function returns, so partial
/// work is abandoned rather than left running in the background.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use portico_common::resilience::with_deadline;
///
/// # async fn example() {
/// let result = with_deadline("fast_op", Duration::from_secs(1), async { 2 + 2 }).await;
/// assert_eq!(result.unwrap(), 4);
/// # }
/// ```
pub async fn with_deadline<F>(
    operation: &str,
    budget: Duration,
    future: F,
) -> Result<F::Output, DeadlineElapsed>
where
    F: Future,
{
    match tokio::time::timeout(budget, future).await {
        Ok(output) => Ok(output),
        Err(_) => {
            warn!(operation, budget_ms = budget.as_millis() as u64, "deadline elapsed");
            Err(DeadlineElapsed { operation: operation.to_string(), budget })
        }
    }
}
