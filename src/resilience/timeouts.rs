//! Timeout enforcement for external calls.
//!
//! # Responsibilities
//! - Wrap every collaborator call (limiter, verifier, store) with a deadline
//! - Keep a timeout distinct from the collaborator's own error
//! - Record how long each stage took
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - No retries: a timed-out stage fails the request

use std::future::Future;
use std::time::{Duration, Instant};

use crate::observability::metrics;

/// Outcome of a deadline-bounded call that did not succeed.
#[derive(Debug, PartialEq, Eq)]
pub enum StageFailure<E> {
    /// The deadline elapsed first.
    TimedOut(Duration),
    /// The call itself failed.
    Failed(E),
}

impl<E: std::fmt::Display> std::fmt::Display for StageFailure<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageFailure::TimedOut(d) => write!(f, "timed out after {} ms", d.as_millis()),
            StageFailure::Failed(e) => write!(f, "{}", e),
        }
    }
}

/// Run `fut` under `deadline`, recording its duration against `stage`.
pub async fn call_with_deadline<F, T, E>(
    stage: &'static str,
    deadline: Duration,
    fut: F,
) -> Result<T, StageFailure<E>>
where
    F: Future<Output = Result<T, E>>,
{
    let start = Instant::now();
    let result = tokio::time::timeout(deadline, fut).await;
    metrics::record_stage_duration(stage, start);

    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(StageFailure::Failed(e)),
        Err(_) => Err(StageFailure::TimedOut(deadline)),
    }
}
