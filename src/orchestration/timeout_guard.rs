//! # Timeout Guard
//!
//! Runs one observer invocation under a hard wall-clock budget.
//!
//! The body is spawned as its own task so the guard can stop waiting for it at
//! any moment. On timeout the task is aborted and its result is abandoned; the
//! run id it was started with is invalidated by the caller so a late write to
//! the health tracker is rejected. On cancellation the body gets a bounded
//! window (the smaller of the drain timeout and its remaining budget) to
//! unwind before it is aborted. Cancelled results are always discarded.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::shutdown::CancellationSignal;
use crate::error::{ObserverError, Result};
use crate::health::RunId;
use crate::logging::log_observer_operation;
use crate::observer::{Observation, Observer};

/// How an invocation ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    /// Finished within budget
    Completed(Observation),
    /// Returned an error or panicked
    Faulted(ObserverError),
    /// Budget exceeded; result abandoned
    TimedOut,
    /// Cancellation arrived first; result discarded
    Cancelled,
}

/// Ephemeral result of one guarded invocation
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub observer: String,
    pub run_id: RunId,
    pub budget: Duration,
    pub elapsed: Duration,
    pub status: RunStatus,
}

impl RunOutcome {
    pub fn completed(&self) -> bool {
        matches!(self.status, RunStatus::Completed(_))
    }

    pub fn error(&self) -> Option<&ObserverError> {
        match &self.status {
            RunStatus::Faulted(error) => Some(error),
            _ => None,
        }
    }

    pub fn took_longer_than_budget(&self) -> bool {
        matches!(self.status, RunStatus::TimedOut)
    }

    pub fn was_cancelled(&self) -> bool {
        matches!(self.status, RunStatus::Cancelled)
    }

    pub fn observation(&self) -> Option<&Observation> {
        match &self.status {
            RunStatus::Completed(observation) => Some(observation),
            _ => None,
        }
    }
}

/// Deadline used when `started + budget` is not representable
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug, Clone)]
pub struct TimeoutGuard {
    drain_timeout: Duration,
}

impl TimeoutGuard {
    pub fn new(drain_timeout: Duration) -> Self {
        Self { drain_timeout }
    }

    /// Invoke `observer` and wait at most `budget` for it
    pub async fn execute(
        &self,
        observer: Arc<dyn Observer>,
        budget: Duration,
        run_id: RunId,
        signal: &CancellationSignal,
    ) -> RunOutcome {
        let name = observer.name().to_string();
        let started = Instant::now();
        let deadline = started
            .checked_add(budget)
            .unwrap_or_else(|| started + FAR_FUTURE);

        let body_signal = signal.clone();
        let mut handle = tokio::spawn(async move { observer.observe(body_signal).await });

        let mut status = tokio::select! {
            biased;
            joined = &mut handle => Self::status_from_join(&name, joined, signal.is_cancelled()),
            _ = tokio::time::sleep_until(deadline) => {
                handle.abort();
                RunStatus::TimedOut
            }
            _ = signal.cancelled() => {
                self.drain(&name, &mut handle, deadline).await;
                RunStatus::Cancelled
            }
        };

        if signal.is_cancelled() && matches!(status, RunStatus::Completed(_)) {
            status = RunStatus::Cancelled;
        }

        let outcome = RunOutcome {
            observer: name,
            run_id,
            budget,
            elapsed: started.elapsed(),
            status,
        };
        Self::log_outcome(&outcome);
        outcome
    }

    /// A cancellation that did not come from shutdown is the observer's own
    /// failure and is treated as a fault.
    fn status_from_join(
        name: &str,
        joined: std::result::Result<Result<Observation>, JoinError>,
        shutting_down: bool,
    ) -> RunStatus {
        match joined {
            Ok(Ok(observation)) => RunStatus::Completed(observation),
            Ok(Err(error)) if error.is_cancellation() && shutting_down => RunStatus::Cancelled,
            Ok(Err(error)) => RunStatus::Faulted(error),
            Err(join_error) if join_error.is_cancelled() && shutting_down => RunStatus::Cancelled,
            Err(join_error) if join_error.is_cancelled() => RunStatus::Faulted(
                ObserverError::observer_fault(name, "task cancelled outside shutdown"),
            ),
            Err(join_error) => {
                RunStatus::Faulted(ObserverError::observer_fault(name, panic_reason(join_error)))
            }
        }
    }

    async fn drain(
        &self,
        name: &str,
        handle: &mut tokio::task::JoinHandle<Result<Observation>>,
        deadline: Instant,
    ) {
        let window = deadline
            .saturating_duration_since(Instant::now())
            .min(self.drain_timeout);

        match tokio::time::timeout(window, &mut *handle).await {
            Ok(_) => debug!(observer = %name, "Observer unwound after cancellation"),
            Err(_) => {
                handle.abort();
                warn!(
                    observer = %name,
                    window_ms = window.as_millis() as u64,
                    "Observer did not unwind after cancellation, aborted"
                );
            }
        }
    }

    fn log_outcome(outcome: &RunOutcome) {
        let status = match &outcome.status {
            RunStatus::Completed(_) => "completed",
            RunStatus::Faulted(_) => "faulted",
            RunStatus::TimedOut => "timed_out",
            RunStatus::Cancelled => "cancelled",
        };
        let details = match &outcome.status {
            RunStatus::Faulted(error) => Some(error.to_string()),
            RunStatus::TimedOut => Some(
                ObserverError::Timeout {
                    observer: outcome.observer.clone(),
                    budget_ms: outcome.budget.as_millis() as u64,
                }
                .to_string(),
            ),
            _ => None,
        };
        log_observer_operation(
            "execute",
            &outcome.observer,
            Some(outcome.run_id),
            status,
            Some(outcome.elapsed.as_millis() as u64),
            details.as_deref(),
        );
    }
}

fn panic_reason(join_error: JoinError) -> String {
    match join_error.try_into_panic() {
        Ok(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            format!("panicked: {message}")
        }
        Err(other) => other.to_string(),
    }
}
