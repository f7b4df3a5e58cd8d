//! Portable collector backed by the `sysinfo` crate.

use async_trait::async_trait;
use parking_lot::Mutex;
use sysinfo::{Disks, System, MINIMUM_CPU_UPDATE_INTERVAL};

use super::{DiskUsage, MemoryUsage, OsInfo, Platform, ResourceCollector};
use crate::error::{ObserverError, Result};
use crate::orchestration::shutdown::CancellationSignal;

#[derive(Debug)]
pub struct SysinfoCollector {
    system: Mutex<System>,
}

impl Default for SysinfoCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoCollector {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

#[async_trait]
impl ResourceCollector for SysinfoCollector {
    fn platform(&self) -> Platform {
        Platform::current()
    }

    async fn memory_usage(&self) -> Result<MemoryUsage> {
        let mut system = self.system.lock();
        system.refresh_memory();

        let total_bytes = system.total_memory();
        if total_bytes == 0 {
            return Err(ObserverError::collector("total memory reported as zero"));
        }
        Ok(MemoryUsage {
            total_bytes,
            in_use_bytes: total_bytes.saturating_sub(system.available_memory()),
        })
    }

    async fn cpu_usage_percent(&self, signal: &CancellationSignal) -> Result<f64> {
        // Usage is a delta between two refreshes
        self.system.lock().refresh_cpu();

        signal
            .run_until_cancelled(tokio::time::sleep(MINIMUM_CPU_UPDATE_INTERVAL))
            .await
            .ok_or_else(|| ObserverError::Cancelled("cpu sampling".to_string()))?;

        let mut system = self.system.lock();
        system.refresh_cpu();
        Ok(f64::from(system.global_cpu_info().cpu_usage()))
    }

    async fn disk_usage(&self) -> Result<Vec<DiskUsage>> {
        let disks = Disks::new_with_refreshed_list();
        Ok(disks
            .list()
            .iter()
            .filter(|disk| disk.total_space() > 0)
            .map(|disk| DiskUsage {
                mount_point: disk.mount_point().display().to_string(),
                total_bytes: disk.total_space(),
                available_bytes: disk.available_space(),
            })
            .collect())
    }

    async fn os_info(&self) -> Result<OsInfo> {
        let name = System::name()
            .ok_or_else(|| ObserverError::collector("operating system name unavailable"))?;
        let unknown = || "unknown".to_string();
        Ok(OsInfo {
            name,
            version: System::os_version().unwrap_or_else(unknown),
            kernel_version: System::kernel_version().unwrap_or_else(unknown),
            uptime_seconds: System::uptime(),
            status: OsInfo::STATUS_OK.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_usage_is_plausible() {
        let collector = SysinfoCollector::new();
        let usage = collector.memory_usage().await.unwrap();
        assert!(usage.total_bytes > 0);
        assert!(usage.in_use_bytes <= usage.total_bytes);
    }

    #[tokio::test]
    async fn test_cpu_sampling_honours_cancellation() {
        let collector = SysinfoCollector::new();
        let signal = CancellationSignal::new();
        signal.cancel();
        let err = collector.cpu_usage_percent(&signal).await.unwrap_err();
        assert!(err.is_cancellation());
    }

    #[tokio::test]
    async fn test_os_info_reports_ok() {
        let info = SysinfoCollector::new().os_info().await.unwrap();
        assert!(!info.name.is_empty());
        assert!(info.is_healthy());
    }

    #[tokio::test]
    async fn test_no_queue_source_reports_no_devices() {
        let queues = SysinfoCollector::new()
            .disk_queue_lengths(&CancellationSignal::new())
            .await
            .unwrap();
        assert!(queues.is_empty());
    }
}
