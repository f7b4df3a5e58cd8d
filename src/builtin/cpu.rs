use async_trait::async_trait;
use std::sync::Arc;

use super::Thresholds;
use crate::collectors::ResourceCollector;
use crate::config::ObserverSettings;
use crate::constants::observers;
use crate::error::Result;
use crate::observer::{Finding, Observation, Observer};
use crate::orchestration::shutdown::CancellationSignal;

/// Machine-wide CPU utilisation against configured thresholds.
///
/// Sampling takes a short window and stops early on cancellation.
pub struct CpuObserver {
    settings: ObserverSettings,
    thresholds: Thresholds,
    collector: Arc<dyn ResourceCollector>,
}

impl CpuObserver {
    pub const WARNING_KEY: &'static str = "cpu_percent_warning";
    pub const ERROR_KEY: &'static str = "cpu_percent_error";

    pub fn new(settings: ObserverSettings, collector: Arc<dyn ResourceCollector>) -> Result<Self> {
        let thresholds = Thresholds::from_settings(
            observers::CPU_CHECK,
            &settings,
            Self::WARNING_KEY,
            Self::ERROR_KEY,
        )?;
        Ok(Self {
            settings,
            thresholds,
            collector,
        })
    }
}

#[async_trait]
impl Observer for CpuObserver {
    fn name(&self) -> &str {
        observers::CPU_CHECK
    }

    fn settings(&self) -> &ObserverSettings {
        &self.settings
    }

    async fn observe(&self, signal: CancellationSignal) -> Result<Observation> {
        let percent = self.collector.cpu_usage_percent(&signal).await?;
        let state = self.thresholds.classify(percent);
        Ok(Observation::from_findings(vec![Finding::new(
            state,
            format!("cpu {percent:.0}%"),
        )]))
    }

    fn update_settings(&self, settings: &ObserverSettings) -> Result<Arc<dyn Observer>> {
        Ok(Arc::new(Self::new(
            settings.clone(),
            Arc::clone(&self.collector),
        )?))
    }
}
