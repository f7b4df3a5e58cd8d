//! # Built-in Observers
//!
//! Disk, memory, CPU and OS checks driven by a [`ResourceCollector`]. The
//! metric checks read warning/error threshold pairs from their settings
//! `parameters`; a missing, unparsable or zero threshold turns that level off.

pub mod cpu;
pub mod disk;
pub mod memory;
pub mod os;

use std::sync::Arc;

use crate::collectors::ResourceCollector;
use crate::config::ObserverSettings;
use crate::constants::{observers, HealthState};
use crate::error::{ObserverError, Result};
use crate::observer::{Observer, ObserverCatalog};

pub use cpu::CpuObserver;
pub use disk::DiskObserver;
pub use memory::MemoryObserver;
pub use os::OsObserver;

/// Warning/error thresholds for one metric
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Thresholds {
    pub warning: Option<f64>,
    pub error: Option<f64>,
}

impl Thresholds {
    /// Read percentage thresholds `warning_key` / `error_key` from `settings`
    pub fn from_settings(
        observer: &str,
        settings: &ObserverSettings,
        warning_key: &str,
        error_key: &str,
    ) -> Result<Self> {
        let thresholds = Self::unbounded(observer, settings, warning_key, error_key)?;

        for (key, value) in [(warning_key, thresholds.warning), (error_key, thresholds.error)] {
            if let Some(value) = value {
                if !(0.0..=100.0).contains(&value) {
                    return Err(ObserverError::ConfigurationError(format!(
                        "{observer}: {key} must be a percentage, got {value}"
                    )));
                }
            }
        }

        Ok(thresholds)
    }

    /// Thresholds for a metric with no natural upper bound, such as a queue length
    pub fn unbounded(
        observer: &str,
        settings: &ObserverSettings,
        warning_key: &str,
        error_key: &str,
    ) -> Result<Self> {
        let thresholds = Self {
            warning: read_threshold(settings, warning_key),
            error: read_threshold(settings, error_key),
        };

        if let (Some(warning), Some(error)) = (thresholds.warning, thresholds.error) {
            if warning > error {
                return Err(ObserverError::ConfigurationError(format!(
                    "{observer}: {warning_key} ({warning}) exceeds {error_key} ({error})"
                )));
            }
        }

        Ok(thresholds)
    }

    pub fn is_configured(&self) -> bool {
        self.warning.is_some() || self.error.is_some()
    }

    pub fn classify(&self, value: f64) -> HealthState {
        if self.error.is_some_and(|limit| value >= limit) {
            HealthState::Error
        } else if self.warning.is_some_and(|limit| value >= limit) {
            HealthState::Warning
        } else {
            HealthState::Ok
        }
    }
}

fn read_threshold(settings: &ObserverSettings, key: &str) -> Option<f64> {
    settings
        .parameter_as::<f64>(key)
        .filter(|value| value.is_finite() && *value > 0.0)
}

/// Catalog of the built-in observers, in their default run order
pub fn builtin_catalog(collector: Arc<dyn ResourceCollector>) -> ObserverCatalog {
    let disk = Arc::clone(&collector);
    let memory = Arc::clone(&collector);
    let cpu = Arc::clone(&collector);
    let os = collector;

    ObserverCatalog::new()
        .with(observers::DISK_CHECK, move |settings: &ObserverSettings| {
            Ok(Arc::new(DiskObserver::new(settings.clone(), Arc::clone(&disk))?) as Arc<dyn Observer>)
        })
        .with(observers::MEMORY_CHECK, move |settings: &ObserverSettings| {
            Ok(Arc::new(MemoryObserver::new(settings.clone(), Arc::clone(&memory))?)
                as Arc<dyn Observer>)
        })
        .with(observers::CPU_CHECK, move |settings: &ObserverSettings| {
            Ok(Arc::new(CpuObserver::new(settings.clone(), Arc::clone(&cpu))?) as Arc<dyn Observer>)
        })
        .with(observers::OS_CHECK, move |settings: &ObserverSettings| {
            Ok(Arc::new(OsObserver::new(settings.clone(), Arc::clone(&os))) as Arc<dyn Observer>)
        })
}

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;

    use crate::collectors::{
        DiskQueueLength, DiskUsage, MemoryUsage, OsInfo, Platform, ResourceCollector,
    };
    use crate::error::{ObserverError, Result};
    use crate::orchestration::shutdown::CancellationSignal;

    /// Collector returning fixed values
    #[derive(Debug, Clone, Default)]
    pub struct FixedCollector {
        pub memory_percent: f64,
        pub cpu_percent: f64,
        pub disks: Vec<(String, f64)>,
        pub queues: Vec<(String, f64)>,
        /// `None` reports "OK"
        pub os_status: Option<String>,
        pub fail: bool,
    }

    #[async_trait]
    impl ResourceCollector for FixedCollector {
        fn platform(&self) -> Platform {
            Platform::Other
        }

        async fn memory_usage(&self) -> Result<MemoryUsage> {
            if self.fail {
                return Err(ObserverError::collector("meminfo unavailable"));
            }
            Ok(MemoryUsage {
                total_bytes: 10_000,
                in_use_bytes: (self.memory_percent * 100.0) as u64,
            })
        }

        async fn cpu_usage_percent(&self, signal: &CancellationSignal) -> Result<f64> {
            if signal.is_cancelled() {
                return Err(ObserverError::Cancelled("cpu sampling".to_string()));
            }
            Ok(self.cpu_percent)
        }

        async fn disk_usage(&self) -> Result<Vec<DiskUsage>> {
            Ok(self
                .disks
                .iter()
                .map(|(mount, percent)| DiskUsage {
                    mount_point: mount.clone(),
                    total_bytes: 10_000,
                    available_bytes: 10_000 - (percent * 100.0) as u64,
                })
                .collect())
        }

        async fn disk_queue_lengths(
            &self,
            signal: &CancellationSignal,
        ) -> Result<Vec<DiskQueueLength>> {
            if signal.is_cancelled() {
                return Err(ObserverError::Cancelled("diskstats sampling".to_string()));
            }
            Ok(self
                .queues
                .iter()
                .map(|(device, length)| DiskQueueLength {
                    device: device.clone(),
                    average_queue_length: *length,
                })
                .collect())
        }

        async fn os_info(&self) -> Result<OsInfo> {
            if self.fail {
                return Err(ObserverError::collector("os release unavailable"));
            }
            Ok(OsInfo {
                name: "TestOS".to_string(),
                version: "1.0".to_string(),
                kernel_version: "6.1.0".to_string(),
                uptime_seconds: 3600,
                status: self
                    .os_status
                    .clone()
                    .unwrap_or_else(|| OsInfo::STATUS_OK.to_string()),
            })
        }
    }
}
