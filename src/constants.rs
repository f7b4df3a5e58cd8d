//! # System Constants
//!
//! Core constants and the tri-state health enum shared by every layer of the
//! observer agent.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Tri-state health signal reported for every observer.
///
/// Variants are ordered by severity so `max()` picks the worst finding.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    #[default]
    Ok,
    Warning,
    Error,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Ok => "ok",
            HealthState::Warning => "warning",
            HealthState::Error => "error",
        }
    }

    /// Warning or Error
    pub fn is_issue(&self) -> bool {
        !matches!(self, HealthState::Ok)
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Names and properties used on manager-originated health reports
pub mod system {
    pub const OBSERVER_MANAGER_NAME: &str = "ObserverManager";
    pub const MANAGER_HEALTH_PROPERTY: &str = "ObserverManagerHealth";
    pub const MANAGER_FATAL_PROPERTY: &str = "ObserverManagerFatal";
    pub const MANAGER_SHUTDOWN_PROPERTY: &str = "ObserverManagerShutdown";
    pub const CONFIGURATION_ERROR_PROPERTY: &str = "ConfigurationUpdateError";
    pub const ALL_OBSERVERS_EXECUTED_MESSAGE: &str = "All observers successfully executed.";

    /// Property used when an observer is permanently disabled after a timeout
    pub fn timeout_property(observer_name: &str) -> String {
        format!("{observer_name}HealthError")
    }
}

/// Default values used when configuration omits a setting
pub mod defaults {
    pub const LOOP_SLEEP_SECONDS: u64 = 30;
    pub const EXECUTION_TIMEOUT_SECONDS: u64 = 1800;
    pub const RELOAD_GRACE_PERIOD_MS: u64 = 1000;
    pub const SHUTDOWN_DRAIN_TIMEOUT_MS: u64 = 5000;
    pub const RELOAD_CHANNEL_CAPACITY: usize = 16;
    pub const MINIMUM_REPORT_TTL_SECONDS: u64 = 1;
    /// Longest the scheduler waits on the health sink for one report or flush
    pub const REPORT_SINK_TIMEOUT: super::Duration = super::Duration::from_secs(10);

    /// Lifetime for reports about conditions that only an operator can resolve
    pub const PERMANENT_REPORT_TTL: super::Duration = super::Duration::MAX;
}

/// Built-in observer names
pub mod observers {
    pub const DISK_CHECK: &str = "disk-check";
    pub const MEMORY_CHECK: &str = "memory-check";
    pub const CPU_CHECK: &str = "cpu-check";
    pub const OS_CHECK: &str = "os-check";
}
