use async_trait::async_trait;
use std::sync::Arc;

use super::Thresholds;
use crate::collectors::ResourceCollector;
use crate::config::ObserverSettings;
use crate::constants::observers;
use crate::error::{ObserverError, Result};
use crate::observer::{Finding, Observation, Observer};
use crate::orchestration::shutdown::CancellationSignal;

/// Used-space percentage of every mounted volume, and average queue length
/// of every block device when queue thresholds are configured.
///
/// Produces one finding per volume and device; the worst decides the verdict.
pub struct DiskObserver {
    settings: ObserverSettings,
    thresholds: Thresholds,
    queue_thresholds: Thresholds,
    collector: Arc<dyn ResourceCollector>,
}

impl DiskObserver {
    pub const WARNING_KEY: &'static str = "disk_space_percent_warning";
    pub const ERROR_KEY: &'static str = "disk_space_percent_error";
    pub const QUEUE_WARNING_KEY: &'static str = "average_queue_length_warning";
    pub const QUEUE_ERROR_KEY: &'static str = "average_queue_length_error";

    pub fn new(settings: ObserverSettings, collector: Arc<dyn ResourceCollector>) -> Result<Self> {
        let thresholds = Thresholds::from_settings(
            observers::DISK_CHECK,
            &settings,
            Self::WARNING_KEY,
            Self::ERROR_KEY,
        )?;
        let queue_thresholds = Thresholds::unbounded(
            observers::DISK_CHECK,
            &settings,
            Self::QUEUE_WARNING_KEY,
            Self::QUEUE_ERROR_KEY,
        )?;
        Ok(Self {
            settings,
            thresholds,
            queue_thresholds,
            collector,
        })
    }

    fn interrupted() -> ObserverError {
        ObserverError::Cancelled(format!("{} interrupted", observers::DISK_CHECK))
    }
}

#[async_trait]
impl Observer for DiskObserver {
    fn name(&self) -> &str {
        observers::DISK_CHECK
    }

    fn settings(&self) -> &ObserverSettings {
        &self.settings
    }

    async fn observe(&self, signal: CancellationSignal) -> Result<Observation> {
        let disks = self.collector.disk_usage().await?;
        let mut observation = Observation::healthy();

        for disk in disks {
            if signal.is_cancelled() {
                return Err(Self::interrupted());
            }
            let percent = disk.percent_used();
            observation.push(Finding::new(
                self.thresholds.classify(percent),
                format!("Disk {} is {percent:.1}% full", disk.mount_point),
            ));
        }

        // Queue sampling holds the run for a whole sample window
        if self.queue_thresholds.is_configured() {
            for queue in self.collector.disk_queue_lengths(&signal).await? {
                let length = queue.average_queue_length;
                observation.push(Finding::new(
                    self.queue_thresholds.classify(length),
                    format!("Device {} average queue length is {length:.2}", queue.device),
                ));
            }
        }

        if signal.is_cancelled() {
            return Err(Self::interrupted());
        }
        Ok(observation)
    }

    fn update_settings(&self, settings: &ObserverSettings) -> Result<Arc<dyn Observer>> {
        Ok(Arc::new(Self::new(
            settings.clone(),
            Arc::clone(&self.collector),
        )?))
    }
}
