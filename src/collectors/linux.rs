//! Linux collector.
//!
//! Memory comes straight from `/proc/meminfo` (in use = `MemTotal` -
//! `MemAvailable`, so page cache does not count as pressure). Disk queue
//! lengths come from two `/proc/diskstats` samples. CPU, volumes and OS
//! identity are delegated to [`SysinfoCollector`].

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

use super::{
    DiskQueueLength, DiskUsage, MemoryUsage, OsInfo, Platform, ResourceCollector,
    SysinfoCollector,
};
use crate::error::{ObserverError, Result};
use crate::orchestration::shutdown::CancellationSignal;

const PROC_MEMINFO: &str = "/proc/meminfo";
const PROC_DISKSTATS: &str = "/proc/diskstats";
const DISKSTATS_SAMPLE_WINDOW: Duration = Duration::from_secs(1);

/// Column of "weighted milliseconds spent doing I/O" in a diskstats line
const WEIGHTED_IO_MS_COLUMN: usize = 13;

#[derive(Debug)]
pub struct LinuxCollector {
    meminfo_path: PathBuf,
    diskstats_path: PathBuf,
    fallback: SysinfoCollector,
}

impl Default for LinuxCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl LinuxCollector {
    pub fn new() -> Self {
        Self::with_meminfo_path(PROC_MEMINFO)
    }

    pub fn with_meminfo_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            meminfo_path: path.into(),
            diskstats_path: PathBuf::from(PROC_DISKSTATS),
            fallback: SysinfoCollector::new(),
        }
    }

    pub fn with_diskstats_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.diskstats_path = path.into();
        self
    }

    async fn read_diskstats(&self) -> Result<BTreeMap<String, u64>> {
        let contents = tokio::fs::read_to_string(&self.diskstats_path).await?;
        parse_diskstats(&contents)
    }
}

/// Weighted I/O milliseconds per physical device. Loop and ram devices are skipped.
pub fn parse_diskstats(contents: &str) -> Result<BTreeMap<String, u64>> {
    let mut devices = BTreeMap::new();
    for line in contents.lines() {
        let columns: Vec<&str> = line.split_whitespace().collect();
        let Some(device) = columns.get(2) else {
            continue;
        };
        if device.starts_with("loop") || device.starts_with("ram") {
            continue;
        }
        let weighted = columns.get(WEIGHTED_IO_MS_COLUMN).ok_or_else(|| {
            ObserverError::collector(format!("diskstats line for {device} is truncated"))
        })?;
        let weighted: u64 = weighted.parse().map_err(|e| {
            ObserverError::collector(format!("invalid diskstats value for {device} {e}"))
        })?;
        devices.insert(device.to_string(), weighted);
    }
    Ok(devices)
}

/// Average queue length per device between two diskstats samples
pub fn average_queue_lengths(
    before: &BTreeMap<String, u64>,
    after: &BTreeMap<String, u64>,
    window: Duration,
) -> Vec<DiskQueueLength> {
    let window_ms = window.as_secs_f64() * 1000.0;
    if window_ms <= 0.0 {
        return Vec::new();
    }
    after
        .iter()
        .filter_map(|(device, weighted_after)| {
            let weighted_before = before.get(device)?;
            Some(DiskQueueLength {
                device: device.clone(),
                average_queue_length: weighted_after.saturating_sub(*weighted_before) as f64
                    / window_ms,
            })
        })
        .collect()
}

/// Parse the `MemTotal` and `MemAvailable` lines of a meminfo dump
pub fn parse_meminfo(contents: &str) -> Result<MemoryUsage> {
    let mut total_kb = None;
    let mut available_kb = None;

    for line in contents.lines() {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        let target = match key {
            "MemTotal:" => &mut total_kb,
            "MemAvailable:" => &mut available_kb,
            _ => continue,
        };
        let parsed: u64 = value
            .parse()
            .map_err(|e| ObserverError::collector(format!("invalid meminfo value for {key} {e}")))?;
        *target = Some(parsed);
    }

    let total_kb = total_kb.ok_or_else(|| ObserverError::collector("MemTotal missing from meminfo"))?;
    let available_kb =
        available_kb.ok_or_else(|| ObserverError::collector("MemAvailable missing from meminfo"))?;

    Ok(MemoryUsage {
        total_bytes: total_kb * 1024,
        in_use_bytes: total_kb.saturating_sub(available_kb) * 1024,
    })
}

#[async_trait]
impl ResourceCollector for LinuxCollector {
    fn platform(&self) -> Platform {
        Platform::Linux
    }

    async fn memory_usage(&self) -> Result<MemoryUsage> {
        let contents = tokio::fs::read_to_string(&self.meminfo_path).await?;
        parse_meminfo(&contents)
    }

    async fn cpu_usage_percent(&self, signal: &CancellationSignal) -> Result<f64> {
        self.fallback.cpu_usage_percent(signal).await
    }

    async fn disk_usage(&self) -> Result<Vec<DiskUsage>> {
        self.fallback.disk_usage().await
    }

    async fn disk_queue_lengths(&self, signal: &CancellationSignal) -> Result<Vec<DiskQueueLength>> {
        let before = self.read_diskstats().await?;
        let sampled_from = Instant::now();

        signal
            .run_until_cancelled(tokio::time::sleep(DISKSTATS_SAMPLE_WINDOW))
            .await
            .ok_or_else(|| ObserverError::Cancelled("diskstats sampling".to_string()))?;

        let after = self.read_diskstats().await?;
        Ok(average_queue_lengths(&before, &after, sampled_from.elapsed()))
    }

    async fn os_info(&self) -> Result<OsInfo> {
        self.fallback.os_info().await
    }
}
