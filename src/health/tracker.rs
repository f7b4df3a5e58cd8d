//! # Health Escalation Tracker
//!
//! Per-observer state machine over `{Ok, Warning, Error}`. The tracker turns
//! each completed run into at most one transition:
//!
//! | previous | verdict        | result                          |
//! |----------|----------------|---------------------------------|
//! | any      | Warning/Error  | `Raised` (report with TTL)      |
//! | non-Ok   | Ok             | `Cleared` (report with zero TTL)|
//! | Ok/none  | Ok             | `Unchanged` (nothing emitted)   |
//!
//! There is no background expiry clock. Lapsed issues are expired by the
//! reporting sink from the TTL stamped on the report.
//!
//! Every update must carry the run id handed out by [`HealthTracker::begin_run`].
//! Abandoned (timed out or cancelled) runs lose their id, so a late result
//! from them can never overwrite a record.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::constants::HealthState;
use crate::error::{ObserverError, Result};
use crate::observer::Observation;

/// Identifier of one observer invocation
pub type RunId = u64;

/// Current health of one observer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub state: HealthState,
    pub message: String,
    pub set_at: DateTime<Utc>,
    pub time_to_live: Duration,
    pub has_active_issue: bool,
}

/// What a recorded run changed
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Issue raised or re-affirmed; report with the record's TTL
    Raised(HealthRecord),
    /// Back to Ok after an issue; report once with zero TTL
    Cleared(HealthRecord),
    /// Still Ok, nothing to report
    Unchanged,
}

impl Transition {
    pub fn record(&self) -> Option<&HealthRecord> {
        match self {
            Transition::Raised(record) | Transition::Cleared(record) => Some(record),
            Transition::Unchanged => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct HealthTracker {
    records: DashMap<String, HealthRecord>,
    active_runs: DashMap<String, RunId>,
    next_run_id: AtomicU64,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a run id and make it the only one accepted for `observer`
    pub fn begin_run(&self, observer: &str) -> RunId {
        let run_id = self.next_run_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.active_runs.insert(observer.to_string(), run_id);
        run_id
    }

    /// Invalidate a run so any later update tagged with it is rejected
    pub fn abandon_run(&self, observer: &str, run_id: RunId) {
        if self
            .active_runs
            .remove_if(observer, |_, active| *active == run_id)
            .is_some()
        {
            debug!(observer = %observer, run_id = run_id, "Run abandoned");
        }
    }

    /// Apply a completed run's observation.
    ///
    /// `ttl` is the lifetime to stamp on an issue report; clearing records
    /// always carry a zero TTL.
    pub fn record(
        &self,
        observer: &str,
        run_id: RunId,
        observation: &Observation,
        ttl: Duration,
    ) -> Result<Transition> {
        if self
            .active_runs
            .remove_if(observer, |_, active| *active == run_id)
            .is_none()
        {
            return Err(ObserverError::InvalidState(format!(
                "rejected update from stale run {run_id} of observer {observer}"
            )));
        }

        let verdict = observation.verdict();
        let previous = self.records.get(observer).map(|r| r.state);

        if verdict.state.is_issue() {
            let record = HealthRecord {
                state: verdict.state,
                message: verdict.message,
                set_at: Utc::now(),
                time_to_live: ttl,
                has_active_issue: true,
            };
            self.records.insert(observer.to_string(), record.clone());
            return Ok(Transition::Raised(record));
        }

        match previous {
            Some(state) if state.is_issue() => {
                let record = HealthRecord {
                    state: HealthState::Ok,
                    message: verdict.message,
                    set_at: Utc::now(),
                    time_to_live: Duration::ZERO,
                    has_active_issue: false,
                };
                self.records.insert(observer.to_string(), record.clone());
                Ok(Transition::Cleared(record))
            }
            Some(_) => Ok(Transition::Unchanged),
            None => {
                self.records.insert(
                    observer.to_string(),
                    HealthRecord {
                        state: HealthState::Ok,
                        message: verdict.message,
                        set_at: Utc::now(),
                        time_to_live: Duration::ZERO,
                        has_active_issue: false,
                    },
                );
                Ok(Transition::Unchanged)
            }
        }
    }

    pub fn get(&self, observer: &str) -> Option<HealthRecord> {
        self.records.get(observer).map(|r| r.value().clone())
    }

    pub fn has_active_issue(&self, observer: &str) -> bool {
        self.records
            .get(observer)
            .map(|r| r.has_active_issue)
            .unwrap_or(false)
    }

    /// Read-only copy of every current record, keyed by observer name
    pub fn snapshot(&self) -> BTreeMap<String, HealthRecord> {
        self.records
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}
