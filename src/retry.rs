//! Bounded retries of the booking workflow.
//!
//! Every attempt ends in a verdict: pipeline errors and panics are logged and
//! counted as `Indeterminate`, so the caller never sees them.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::outcome::RunOutcome;
use crate::workflow::Workflow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Pause between attempts; none after the last.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetryReport {
    /// Verdict of the last attempt made.
    pub outcome: RunOutcome,
    pub attempts: u32,
    /// Stopped early by cancellation.
    pub cancelled: bool,
}

/// Run `workflow` until it confirms, `policy.max_attempts` runs have been
/// made, or `cancel` fires between attempts.
pub async fn attempt<W>(workflow: &W, policy: &RetryPolicy, cancel: &CancellationToken) -> RetryReport
where
    W: Workflow + ?Sized,
{
    let max_attempts = policy.max_attempts;
    let mut report = RetryReport {
        outcome: RunOutcome::Indeterminate,
        attempts: 0,
        cancelled: false,
    };
    if max_attempts == 0 {
        warn!("Retry budget is zero, nothing attempted");
        return report;
    }

    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }

        info!(attempt, max_attempts, "Booking attempt");
        report.attempts = attempt;
        report.outcome = match AssertUnwindSafe(workflow.execute()).catch_unwind().await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!(attempt, error = %e, snapshot = ?e.snapshot(), "Attempt failed");
                RunOutcome::Indeterminate
            }
            Err(panic) => {
                error!(attempt, panic = %panic_message(&*panic), "Attempt panicked");
                RunOutcome::Indeterminate
            }
        };

        if report.outcome.is_confirmed() {
            info!(attempt, "Booking confirmed, no further attempts");
            return report;
        }
        warn!(attempt, outcome = %report.outcome, "Attempt not confirmed");

        if attempt < max_attempts && !policy.delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                _ = tokio::time::sleep(policy.delay) => {}
            }
        }
    }

    if report.cancelled {
        warn!(attempts = report.attempts, "Retries cancelled");
    } else {
        warn!(attempts = report.attempts, outcome = %report.outcome, "Retries exhausted");
    }
    report
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
