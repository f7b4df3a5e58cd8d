//! # Health Reports
//!
//! The outbound unit handed to the cluster health sink, plus the
//! [`HealthReporter`] seam and two in-process implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::constants::HealthState;
use crate::error::Result;

/// Who produced a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSource {
    /// An observer's own health verdict
    Observer,
    /// The engine itself (timeouts, pass failures, reload faults, shutdown)
    Manager,
}

/// One health event destined for the reporting sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Reporting entity: an observer name, or `ObserverManager`
    pub source_id: String,
    pub property: String,
    pub state: HealthState,
    pub message: String,
    /// Zero means "clear immediately"
    pub time_to_live: Duration,
    pub source: ReportSource,
    pub node_name: String,
    pub instance_id: Uuid,
    pub emitted_at: DateTime<Utc>,
}

impl HealthReport {
    /// True for Ok reports with a zero lifetime
    pub fn is_clearing(&self) -> bool {
        self.state == HealthState::Ok && self.time_to_live.is_zero()
    }
}

/// Health reporting sink implemented by the surrounding environment.
#[async_trait]
pub trait HealthReporter: Send + Sync {
    async fn report(&self, report: HealthReport) -> Result<()>;

    /// Push out anything buffered. Called once while stopping.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Reporter that writes every report as a structured tracing event
#[derive(Debug, Default, Clone)]
pub struct TracingHealthReporter;

#[async_trait]
impl HealthReporter for TracingHealthReporter {
    async fn report(&self, report: HealthReport) -> Result<()> {
        let ttl_secs = report.time_to_live.as_secs();
        match report.state {
            HealthState::Ok => tracing::info!(
                source_id = %report.source_id,
                property = %report.property,
                node = %report.node_name,
                ttl_secs = ttl_secs,
                "💚 HEALTH: {}",
                report.message
            ),
            HealthState::Warning => tracing::warn!(
                source_id = %report.source_id,
                property = %report.property,
                node = %report.node_name,
                ttl_secs = ttl_secs,
                "💛 HEALTH: {}",
                report.message
            ),
            HealthState::Error => tracing::error!(
                source_id = %report.source_id,
                property = %report.property,
                node = %report.node_name,
                ttl_secs = ttl_secs,
                "❤️ HEALTH: {}",
                report.message
            ),
        }
        Ok(())
    }
}

/// Reporter that keeps every report in memory, in emission order.
///
/// Useful for embedding the engine behind another API and for tests.
#[derive(Debug, Default)]
pub struct MemoryHealthReporter {
    reports: Mutex<Vec<HealthReport>>,
    flushes: Mutex<usize>,
}

impl MemoryHealthReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<HealthReport> {
        self.reports.lock().clone()
    }

    /// Reports whose source id matches
    pub fn reports_for(&self, source_id: &str) -> Vec<HealthReport> {
        self.reports
            .lock()
            .iter()
            .filter(|r| r.source_id == source_id)
            .cloned()
            .collect()
    }

    /// Reports carrying the given property
    pub fn reports_with_property(&self, property: &str) -> Vec<HealthReport> {
        self.reports
            .lock()
            .iter()
            .filter(|r| r.property == property)
            .cloned()
            .collect()
    }

    pub fn flush_count(&self) -> usize {
        *self.flushes.lock()
    }

    pub fn clear(&self) {
        self.reports.lock().clear();
    }
}

#[async_trait]
impl HealthReporter for MemoryHealthReporter {
    async fn report(&self, report: HealthReport) -> Result<()> {
        self.reports.lock().push(report);
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        *self.flushes.lock() += 1;
        Ok(())
    }
}
