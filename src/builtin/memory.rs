use async_trait::async_trait;
use std::sync::Arc;

use super::Thresholds;
use crate::collectors::ResourceCollector;
use crate::config::ObserverSettings;
use crate::constants::observers;
use crate::error::Result;
use crate::observer::{Finding, Observation, Observer};
use crate::orchestration::shutdown::CancellationSignal;

/// Physical memory in-use percentage against configured thresholds
pub struct MemoryObserver {
    settings: ObserverSettings,
    thresholds: Thresholds,
    collector: Arc<dyn ResourceCollector>,
}

impl MemoryObserver {
    pub const WARNING_KEY: &'static str = "memory_percent_warning";
    pub const ERROR_KEY: &'static str = "memory_percent_error";

    pub fn new(settings: ObserverSettings, collector: Arc<dyn ResourceCollector>) -> Result<Self> {
        let thresholds = Thresholds::from_settings(
            observers::MEMORY_CHECK,
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
impl Observer for MemoryObserver {
    fn name(&self) -> &str {
        observers::MEMORY_CHECK
    }

    fn settings(&self) -> &ObserverSettings {
        &self.settings
    }

    async fn observe(&self, _signal: CancellationSignal) -> Result<Observation> {
        let usage = self.collector.memory_usage().await?;
        let percent = usage.percent_in_use();
        let state = self.thresholds.classify(percent);

        Ok(Observation::from_findings(vec![Finding::new(
            state,
            format!(
                "Memory in use is {percent:.1}% ({} MB of {} MB)",
                usage.in_use_bytes / (1024 * 1024),
                usage.total_bytes / (1024 * 1024)
            ),
        )]))
    }

    fn update_settings(&self, settings: &ObserverSettings) -> Result<Arc<dyn Observer>> {
        Ok(Arc::new(Self::new(
            settings.clone(),
            Arc::clone(&self.collector),
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::testing::FixedCollector;
    use crate::constants::HealthState;

    fn observer(memory_percent: f64, fail: bool) -> MemoryObserver {
        let settings = ObserverSettings::default()
            .with_parameter(MemoryObserver::WARNING_KEY, "80")
            .with_parameter(MemoryObserver::ERROR_KEY, "95");
        MemoryObserver::new(
            settings,
            Arc::new(FixedCollector {
                memory_percent,
                fail,
                ..FixedCollector::default()
            }),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_memory_levels() {
        for (percent, expected) in [
            (40.0, HealthState::Ok),
            (85.0, HealthState::Warning),
            (96.0, HealthState::Error),
        ] {
            let observation = observer(percent, false)
                .observe(CancellationSignal::new())
                .await
                .unwrap();
            assert_eq!(observation.verdict().state, expected, "at {percent}%");
        }
    }

    #[tokio::test]
    async fn test_collector_failure_is_an_error() {
        let result = observer(50.0, true).observe(CancellationSignal::new()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_update_settings_builds_new_instance() {
        let original = observer(50.0, false);
        let updated = original
            .update_settings(&ObserverSettings::default().with_parameter(MemoryObserver::ERROR_KEY, "70"))
            .unwrap();
        assert_eq!(updated.name(), observers::MEMORY_CHECK);
        assert_eq!(updated.settings().parameter(MemoryObserver::ERROR_KEY), Some("70"));
        assert_eq!(original.settings().parameter(MemoryObserver::ERROR_KEY), Some("95"));
    }
}
