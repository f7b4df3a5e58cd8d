//! # Observer Agent Configuration
//!
//! Typed configuration for the observer manager and the per-observer settings
//! sections. The engine never parses raw key/value settings itself: it receives
//! a [`SettingsSnapshot`], either at startup from [`ConfigManager`] or later over
//! the reload channel.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use observer_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigManager::load()?;
//! let sleep = config.config().manager.loop_sleep();
//! let snapshot = config.config().snapshot();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::defaults;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring `observer-agent.toml`
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Observer manager (scheduler) settings
    pub manager: ManagerConfig,

    /// One named section per observer
    pub observers: BTreeMap<String, ObserverSettings>,
}

impl AgentConfig {
    /// Structured snapshot of every observer section
    pub fn snapshot(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            observers: self.observers.clone(),
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.manager.validate()?;
        self.snapshot().validate()
    }
}

/// Observer manager settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ManagerConfig {
    /// Node identity stamped on every health report
    pub node_name: String,
    /// Sleep between passes
    pub loop_sleep_seconds: u64,
    /// Execution budget for observers that do not configure their own
    pub execution_timeout_seconds: u64,
    /// How long a reload waits for an in-flight pass before logging that it is still waiting
    pub reload_grace_period_ms: u64,
    /// Upper bound on draining an in-flight observer during shutdown
    pub shutdown_drain_timeout_ms: u64,
    pub enable_verbose_logging: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            loop_sleep_seconds: defaults::LOOP_SLEEP_SECONDS,
            execution_timeout_seconds: defaults::EXECUTION_TIMEOUT_SECONDS,
            reload_grace_period_ms: defaults::RELOAD_GRACE_PERIOD_MS,
            shutdown_drain_timeout_ms: defaults::SHUTDOWN_DRAIN_TIMEOUT_MS,
            enable_verbose_logging: false,
        }
    }
}

impl ManagerConfig {
    pub fn loop_sleep(&self) -> Duration {
        Duration::from_secs(self.loop_sleep_seconds)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_seconds)
    }

    pub fn reload_grace_period(&self) -> Duration {
        Duration::from_millis(self.reload_grace_period_ms)
    }

    pub fn shutdown_drain_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_drain_timeout_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.node_name.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "node_name",
                "manager",
            ));
        }
        if self.execution_timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "execution_timeout_seconds",
                "0",
                "execution timeout must be greater than zero",
            ));
        }
        if self.shutdown_drain_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "shutdown_drain_timeout_ms",
                "0",
                "drain timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}

fn default_node_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

/// Settings for a single observer, as delivered in a snapshot
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObserverSettings {
    pub enabled: bool,
    /// Skip the observer when its last run is newer than this. Zero runs it every pass.
    pub run_interval_seconds: u64,
    /// Overrides the manager-wide execution budget
    pub execution_timeout_seconds: Option<u64>,
    /// Fixed lifetime for issue reports; computed from the run cadence when absent
    pub health_report_ttl_seconds: Option<u64>,
    /// Observer-specific thresholds
    pub parameters: BTreeMap<String, String>,
}

impl Default for ObserverSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            run_interval_seconds: 0,
            execution_timeout_seconds: None,
            health_report_ttl_seconds: None,
            parameters: BTreeMap::new(),
        }
    }
}

impl ObserverSettings {
    pub fn run_interval_minimum(&self) -> Duration {
        Duration::from_secs(self.run_interval_seconds)
    }

    /// Execution budget, falling back to the manager-wide default
    pub fn execution_timeout(&self, default: Duration) -> Duration {
        self.execution_timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(default)
    }

    pub fn health_report_ttl(&self) -> Option<Duration> {
        self.health_report_ttl_seconds.map(Duration::from_secs)
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    /// Parsed parameter; unparsable values read as absent
    pub fn parameter_as<T: FromStr>(&self, key: &str) -> Option<T> {
        self.parameter(key).and_then(|v| v.trim().parse().ok())
    }

    pub fn with_parameter<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self, name: &str) -> ConfigResult<()> {
        if self.execution_timeout_seconds == Some(0) {
            return Err(ConfigurationError::invalid_value(
                format!("observers.{name}.execution_timeout_seconds"),
                "0",
                "execution timeout must be greater than zero",
            ));
        }
        if self.health_report_ttl_seconds == Some(0) {
            return Err(ConfigurationError::validation_error(format!(
                "observers.{name}.health_report_ttl_seconds is zero, issues would clear as soon as they are raised"
            )));
        }
        Ok(())
    }
}

/// Structured snapshot of all observer sections, keyed by observer name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    observers: BTreeMap<String, ObserverSettings>,
}

impl SettingsSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer<N: Into<String>>(mut self, name: N, settings: ObserverSettings) -> Self {
        self.observers.insert(name.into(), settings);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ObserverSettings> {
        self.observers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.observers.contains_key(name)
    }

    /// Observer names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.observers.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ObserverSettings)> {
        self.observers.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn validate(&self) -> ConfigResult<()> {
        for (name, settings) in &self.observers {
            if !is_valid_observer_name(name) {
                return Err(ConfigurationError::invalid_value(
                    "observers",
                    name.clone(),
                    "observer names must be non-empty and contain only alphanumerics, '-' or '_'",
                ));
            }
            settings.validate(name)?;
        }
        Ok(())
    }
}

fn is_valid_observer_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manager_defaults() {
        let manager = ManagerConfig::default();
        assert_eq!(manager.loop_sleep(), Duration::from_secs(30));
        assert_eq!(manager.execution_timeout(), Duration::from_secs(1800));
        assert_eq!(manager.reload_grace_period(), Duration::from_millis(1000));
        assert!(manager.validate().is_ok());
    }

    #[test]
    fn test_manager_rejects_zero_timeout() {
        let manager = ManagerConfig {
            execution_timeout_seconds: 0,
            ..ManagerConfig::default()
        };
        assert!(matches!(
            manager.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_observer_settings_timeout_fallback() {
        let default_budget = Duration::from_secs(60);
        let settings = ObserverSettings::default();
        assert_eq!(settings.execution_timeout(default_budget), default_budget);

        let settings = ObserverSettings {
            execution_timeout_seconds: Some(2),
            ..ObserverSettings::default()
        };
        assert_eq!(
            settings.execution_timeout(default_budget),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_parameter_parsing() {
        let settings = ObserverSettings::default()
            .with_parameter("disk_space_percent_warning", "85")
            .with_parameter("disk_space_percent_error", "not-a-number");

        assert_eq!(
            settings.parameter_as::<f64>("disk_space_percent_warning"),
            Some(85.0)
        );
        assert_eq!(settings.parameter_as::<f64>("disk_space_percent_error"), None);
        assert_eq!(settings.parameter_as::<f64>("missing"), None);
    }

    #[test]
    fn test_snapshot_names_are_sorted() {
        let snapshot = SettingsSnapshot::new()
            .with_observer("memory-check", ObserverSettings::default())
            .with_observer("cpu-check", ObserverSettings::default())
            .with_observer("disk-check", ObserverSettings::default());

        let names: Vec<&str> = snapshot.names().collect();
        assert_eq!(names, vec!["cpu-check", "disk-check", "memory-check"]);
    }

    #[test]
    fn test_snapshot_rejects_bad_names() {
        let snapshot = SettingsSnapshot::new().with_observer("disk check!", ObserverSettings::default());
        assert!(snapshot.validate().is_err());

        let snapshot = SettingsSnapshot::new().with_observer(
            "disk-check",
            ObserverSettings {
                execution_timeout_seconds: Some(0),
                ..ObserverSettings::default()
            },
        );
        assert!(snapshot.validate().is_err());

        let snapshot = SettingsSnapshot::new().with_observer(
            "cpu-check",
            ObserverSettings {
                health_report_ttl_seconds: Some(0),
                ..ObserverSettings::default()
            },
        );
        assert!(matches!(
            snapshot.validate(),
            Err(ConfigurationError::ValidationError { .. })
        ));
    }
}
