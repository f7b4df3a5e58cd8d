use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::collectors::ResourceCollector;
use crate::config::ObserverSettings;
use crate::constants::observers;
use crate::error::{ObserverError, Result};
use crate::observer::{Finding, Observation, Observer};
use crate::orchestration::shutdown::CancellationSignal;

/// Operating system status and identity.
///
/// Raises Error while the platform reports a status other than OK. A healthy
/// run carries the OS summary as its Ok finding, so the clearing report of a
/// recovered node says what it recovered to.
pub struct OsObserver {
    settings: ObserverSettings,
    collector: Arc<dyn ResourceCollector>,
}

impl OsObserver {
    pub fn new(settings: ObserverSettings, collector: Arc<dyn ResourceCollector>) -> Self {
        Self {
            settings,
            collector,
        }
    }
}

#[async_trait]
impl Observer for OsObserver {
    fn name(&self) -> &str {
        observers::OS_CHECK
    }

    fn settings(&self) -> &ObserverSettings {
        &self.settings
    }

    async fn observe(&self, signal: CancellationSignal) -> Result<Observation> {
        let os = self.collector.os_info().await?;
        if signal.is_cancelled() {
            return Err(ObserverError::Cancelled(format!(
                "{} interrupted",
                observers::OS_CHECK
            )));
        }

        let summary = os.summary();
        info!(
            observer = observers::OS_CHECK,
            os = %os.name,
            version = %os.version,
            kernel = %os.kernel_version,
            uptime_seconds = os.uptime_seconds,
            status = %os.status,
            "🖥️ OS: {}", summary
        );

        let finding = if os.is_healthy() {
            Finding::ok(format!("OS reporting healthy: {summary}"))
        } else {
            Finding::error(format!("OS reporting unhealthy: {}", os.status))
        };
        Ok(Observation::from_findings(vec![finding]))
    }

    fn update_settings(&self, settings: &ObserverSettings) -> Result<Arc<dyn Observer>> {
        Ok(Arc::new(Self::new(
            settings.clone(),
            Arc::clone(&self.collector),
        )))
    }
}
