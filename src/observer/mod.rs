//! # Observers
//!
//! The [`Observer`] capability the engine schedules, the findings it produces,
//! and the registry/catalog that hold observer instances between passes.

pub mod catalog;
pub mod registry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::ObserverSettings;
use crate::constants::HealthState;
use crate::error::Result;
use crate::orchestration::shutdown::CancellationSignal;

pub use catalog::{ObserverCatalog, ObserverFactory};
pub use registry::{ObserverRegistration, ObserverRegistry, ObserverStatus, ReloadPlan};

/// A named unit of diagnostic work.
///
/// The engine treats observers opaquely: it reads their settings, runs
/// [`Observer::observe`] under a time budget, and feeds the returned
/// [`Observation`] to the health tracker.
#[async_trait]
pub trait Observer: Send + Sync + 'static {
    /// Stable identifier, unique within a registry
    fn name(&self) -> &str;

    /// Settings this instance was built with
    fn settings(&self) -> &ObserverSettings;

    /// Perform one diagnostic run.
    ///
    /// Long-running work should watch `signal` and return
    /// [`ObserverError::Cancelled`](crate::error::ObserverError::Cancelled)
    /// promptly once it fires.
    async fn observe(&self, signal: CancellationSignal) -> Result<Observation>;

    /// Build a replacement instance carrying `settings`.
    ///
    /// Must not mutate `self`: reload applies settings to fresh instances and
    /// only swaps them in once every observer accepted its new settings.
    fn update_settings(&self, settings: &ObserverSettings) -> Result<Arc<dyn Observer>>;
}

/// One metric's verdict within a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub state: HealthState,
    pub message: String,
}

impl Finding {
    pub fn new<M: Into<String>>(state: HealthState, message: M) -> Self {
        Self {
            state,
            message: message.into(),
        }
    }

    pub fn ok<M: Into<String>>(message: M) -> Self {
        Self::new(HealthState::Ok, message)
    }

    pub fn warning<M: Into<String>>(message: M) -> Self {
        Self::new(HealthState::Warning, message)
    }

    pub fn error<M: Into<String>>(message: M) -> Self {
        Self::new(HealthState::Error, message)
    }
}

/// Folded result of an observation: one state and one message
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub state: HealthState,
    pub message: String,
}

/// Everything one run found
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub findings: Vec<Finding>,
}

impl Observation {
    pub fn healthy() -> Self {
        Self::default()
    }

    pub fn from_findings(findings: Vec<Finding>) -> Self {
        Self { findings }
    }

    pub fn push(&mut self, finding: Finding) {
        self.findings.push(finding);
    }

    pub fn has_issue(&self) -> bool {
        self.findings.iter().any(|f| f.state.is_issue())
    }

    /// Highest severity wins; among equal severities the first finding wins.
    pub fn verdict(&self) -> Verdict {
        let mut worst: Option<&Finding> = None;
        for finding in &self.findings {
            if worst.map_or(true, |w| finding.state > w.state) {
                worst = Some(finding);
            }
        }

        match worst {
            Some(finding) => Verdict {
                state: finding.state,
                message: finding.message.clone(),
            },
            None => Verdict {
                state: HealthState::Ok,
                message: "No issues detected".to_string(),
            },
        }
    }
}
