//! # Health
//!
//! Health Escalation Tracker and the outbound report types.

pub mod report;
pub mod tracker;

pub use report::{HealthReport, HealthReporter, MemoryHealthReporter, ReportSource, TracingHealthReporter};
pub use tracker::{HealthRecord, HealthTracker, RunId, Transition};

/// Property under which an observer's own verdict is reported
pub fn observer_health_property(observer_name: &str) -> String {
    format!("{observer_name}Health")
}
