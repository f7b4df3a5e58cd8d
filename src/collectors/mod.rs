//! # Resource Collectors
//!
//! Platform-specific metric sources injected into the built-in observers.
//! The variant is picked once by [`create_collector`]; nothing downstream
//! branches on platform.

pub mod linux;
pub mod sysinfo_collector;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::error::Result;
use crate::orchestration::shutdown::CancellationSignal;

pub use linux::LinuxCollector;
pub use sysinfo_collector::SysinfoCollector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Linux,
    Windows,
    MacOs,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        match std::env::consts::OS {
            "linux" => Platform::Linux,
            "windows" => Platform::Windows,
            "macos" => Platform::MacOs,
            _ => Platform::Other,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Linux => "linux",
            Platform::Windows => "windows",
            Platform::MacOs => "macos",
            Platform::Other => "other",
        };
        f.write_str(name)
    }
}

/// Physical memory snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub total_bytes: u64,
    pub in_use_bytes: u64,
}

impl MemoryUsage {
    pub fn percent_in_use(&self) -> f64 {
        percent(self.in_use_bytes, self.total_bytes)
    }
}

/// Space on one mounted volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub mount_point: String,
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl DiskUsage {
    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.available_bytes)
    }

    pub fn percent_used(&self) -> f64 {
        percent(self.used_bytes(), self.total_bytes)
    }
}

/// Average number of requests waiting on one block device over a sample window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskQueueLength {
    pub device: String,
    pub average_queue_length: f64,
}

/// Operating system identity and status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsInfo {
    pub name: String,
    pub version: String,
    pub kernel_version: String,
    pub uptime_seconds: u64,
    /// `"OK"` when the platform reports itself healthy
    pub status: String,
}

impl OsInfo {
    pub const STATUS_OK: &'static str = "OK";

    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case(Self::STATUS_OK)
    }

    pub fn summary(&self) -> String {
        format!(
            "{} {} (kernel {}), up {}h",
            self.name,
            self.version,
            self.kernel_version,
            self.uptime_seconds / 3600
        )
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64) * 100.0
}

/// Source of machine metrics
#[async_trait]
pub trait ResourceCollector: Send + Sync {
    fn platform(&self) -> Platform;

    async fn memory_usage(&self) -> Result<MemoryUsage>;

    /// Machine-wide CPU utilisation sampled over a short window.
    /// Returns [`ObserverError::Cancelled`](crate::error::ObserverError::Cancelled)
    /// if `signal` fires while sampling.
    async fn cpu_usage_percent(&self, signal: &CancellationSignal) -> Result<f64>;

    /// Usage of every mounted volume with a non-zero size
    async fn disk_usage(&self) -> Result<Vec<DiskUsage>>;

    /// Average queue length per block device, sampled over a short window.
    /// Platforms without a source report no devices.
    async fn disk_queue_lengths(&self, _signal: &CancellationSignal) -> Result<Vec<DiskQueueLength>> {
        Ok(Vec::new())
    }

    async fn os_info(&self) -> Result<OsInfo>;
}

/// Collector for the platform this process runs on
pub fn create_collector() -> Arc<dyn ResourceCollector> {
    create_collector_for(Platform::current())
}

pub fn create_collector_for(platform: Platform) -> Arc<dyn ResourceCollector> {
    let collector: Arc<dyn ResourceCollector> = match platform {
        Platform::Linux => Arc::new(LinuxCollector::new()),
        _ => Arc::new(SysinfoCollector::new()),
    };
    info!(platform = %platform, "📊 COLLECTOR: Resource collector selected");
    collector
}
