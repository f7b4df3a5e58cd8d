//! # Engine Context
//!
//! Everything the scheduler, tracker and reload coordinator share, built once
//! at startup and passed explicitly. There are no process-wide singletons.

use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::shutdown::ShutdownCoordinator;
use crate::config::ManagerConfig;
use crate::constants::{defaults, system, HealthState};
use crate::health::{
    observer_health_property, HealthRecord, HealthReport, HealthReporter, HealthTracker,
    ReportSource, TracingHealthReporter,
};
use crate::logging::{TelemetrySink, TracingTelemetrySink};
use crate::observer::ObserverCatalog;

pub struct EngineContext {
    pub manager: ManagerConfig,
    pub health_reporter: Arc<dyn HealthReporter>,
    pub telemetry: Arc<dyn TelemetrySink>,
    pub tracker: Arc<HealthTracker>,
    pub shutdown: Arc<ShutdownCoordinator>,
    pub catalog: ObserverCatalog,
    /// Stamped on every report so sinks can tell agent restarts apart
    pub instance_id: Uuid,
}

impl fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineContext")
            .field("node_name", &self.manager.node_name)
            .field("instance_id", &self.instance_id)
            .field("catalog", &self.catalog)
            .field("shutdown_state", &self.shutdown.state())
            .finish()
    }
}

impl EngineContext {
    pub fn builder(manager: ManagerConfig) -> EngineContextBuilder {
        EngineContextBuilder::new(manager)
    }

    pub fn node_name(&self) -> &str {
        &self.manager.node_name
    }

    /// Report originating from the engine itself
    pub fn manager_report(
        &self,
        property: impl Into<String>,
        state: HealthState,
        message: impl Into<String>,
        time_to_live: Duration,
    ) -> HealthReport {
        HealthReport {
            source_id: system::OBSERVER_MANAGER_NAME.to_string(),
            property: property.into(),
            state,
            message: message.into(),
            time_to_live,
            source: ReportSource::Manager,
            node_name: self.manager.node_name.clone(),
            instance_id: self.instance_id,
            emitted_at: Utc::now(),
        }
    }

    /// Report carrying an observer's tracked record
    pub fn observer_report(&self, observer: &str, record: &HealthRecord) -> HealthReport {
        HealthReport {
            source_id: observer.to_string(),
            property: observer_health_property(observer),
            state: record.state,
            message: record.message.clone(),
            time_to_live: record.time_to_live,
            source: ReportSource::Observer,
            node_name: self.manager.node_name.clone(),
            instance_id: self.instance_id,
            emitted_at: Utc::now(),
        }
    }

    /// Send a report; sink failures and stalls go to telemetry and never propagate
    pub async fn emit(&self, report: HealthReport) {
        let property = report.property.clone();
        let sent = tokio::time::timeout(
            defaults::REPORT_SINK_TIMEOUT,
            self.health_reporter.report(report),
        )
        .await;
        match sent {
            Ok(Ok(())) => {}
            Ok(Err(error)) => self
                .telemetry
                .log_error(&format!("Failed to emit health report {property}: {error}")),
            Err(_) => self.telemetry.log_error(&format!(
                "Failed to emit health report {property}: sink did not respond within {}s",
                defaults::REPORT_SINK_TIMEOUT.as_secs()
            )),
        }
    }

    /// Flush the sink; failures and stalls go to telemetry
    pub async fn flush(&self) {
        let flushed =
            tokio::time::timeout(defaults::REPORT_SINK_TIMEOUT, self.health_reporter.flush()).await;
        match flushed {
            Ok(Ok(())) => {}
            Ok(Err(error)) => self
                .telemetry
                .log_error(&format!("Failed to flush health reports: {error}")),
            Err(_) => self.telemetry.log_error(&format!(
                "Failed to flush health reports: sink did not respond within {}s",
                defaults::REPORT_SINK_TIMEOUT.as_secs()
            )),
        }
    }
}

pub struct EngineContextBuilder {
    manager: ManagerConfig,
    health_reporter: Option<Arc<dyn HealthReporter>>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
    catalog: ObserverCatalog,
    shutdown: Option<Arc<ShutdownCoordinator>>,
}

impl EngineContextBuilder {
    fn new(manager: ManagerConfig) -> Self {
        Self {
            manager,
            health_reporter: None,
            telemetry: None,
            catalog: ObserverCatalog::new(),
            shutdown: None,
        }
    }

    pub fn health_reporter(mut self, reporter: Arc<dyn HealthReporter>) -> Self {
        self.health_reporter = Some(reporter);
        self
    }

    pub fn telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn catalog(mut self, catalog: ObserverCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn shutdown(mut self, shutdown: Arc<ShutdownCoordinator>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn build(self) -> Arc<EngineContext> {
        Arc::new(EngineContext {
            health_reporter: self
                .health_reporter
                .unwrap_or_else(|| Arc::new(TracingHealthReporter)),
            telemetry: self
                .telemetry
                .unwrap_or_else(|| Arc::new(TracingTelemetrySink::new(system::OBSERVER_MANAGER_NAME))),
            tracker: Arc::new(HealthTracker::new()),
            shutdown: self
                .shutdown
                .unwrap_or_else(|| Arc::new(ShutdownCoordinator::new())),
            catalog: self.catalog,
            instance_id: Uuid::new_v4(),
            manager: self.manager,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::MemoryHealthReporter;

    #[tokio::test]
    async fn test_manager_report_is_stamped() {
        let reporter = Arc::new(MemoryHealthReporter::new());
        let context = EngineContext::builder(ManagerConfig {
            node_name: "node-01".to_string(),
            ..ManagerConfig::default()
        })
        .health_reporter(reporter.clone())
        .build();

        let report = context.manager_report(
            system::MANAGER_HEALTH_PROPERTY,
            HealthState::Error,
            "1 observer faulted",
            Duration::from_secs(60),
        );
        context.emit(report).await;

        let sent = reporter.reports();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].source_id, system::OBSERVER_MANAGER_NAME);
        assert_eq!(sent[0].source, ReportSource::Manager);
        assert_eq!(sent[0].node_name, "node-01");
        assert_eq!(sent[0].instance_id, context.instance_id);
    }

    #[test]
    fn test_observer_report_uses_record() {
        let context = EngineContext::builder(ManagerConfig::default()).build();
        let record = HealthRecord {
            state: HealthState::Warning,
            message: "cpu 85%".to_string(),
            set_at: Utc::now(),
            time_to_live: Duration::from_secs(90),
            has_active_issue: true,
        };
        let report = context.observer_report("cpu-check", &record);
        assert_eq!(report.property, "cpu-checkHealth");
        assert_eq!(report.state, HealthState::Warning);
        assert_eq!(report.time_to_live, Duration::from_secs(90));
    }

    struct Unreachable;

    #[async_trait::async_trait]
    impl HealthReporter for Unreachable {
        async fn report(&self, _report: HealthReport) -> crate::error::Result<()> {
            Err(crate::error::ObserverError::ReportingError(
                "sink unreachable".to_string(),
            ))
        }
    }

    #[derive(Default)]
    struct Errors(parking_lot::Mutex<Vec<String>>);

    impl TelemetrySink for Errors {
        fn log_info(&self, _message: &str) {}
        fn log_warning(&self, _message: &str) {}
        fn log_error(&self, message: &str) {
            self.0.lock().push(message.to_string());
        }
    }

    #[tokio::test]
    async fn test_sink_failure_goes_to_telemetry() {
        let telemetry = Arc::new(Errors::default());
        let context = EngineContext::builder(ManagerConfig::default())
            .health_reporter(Arc::new(Unreachable))
            .telemetry(telemetry.clone())
            .build();

        let report = context.manager_report(
            system::MANAGER_SHUTDOWN_PROPERTY,
            HealthState::Ok,
            "stopping",
            Duration::ZERO,
        );
        context.emit(report).await;

        let errors = telemetry.0.lock().clone();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("ObserverManagerShutdown"));
        assert!(errors[0].contains("sink unreachable"));
    }

    struct Stalled;

    #[async_trait::async_trait]
    impl HealthReporter for Stalled {
        async fn report(&self, _report: HealthReport) -> crate::error::Result<()> {
            std::future::pending().await
        }

        async fn flush(&self) -> crate::error::Result<()> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_sink_is_bounded() {
        let telemetry = Arc::new(Errors::default());
        let context = EngineContext::builder(ManagerConfig::default())
            .health_reporter(Arc::new(Stalled))
            .telemetry(telemetry.clone())
            .build();

        let started = tokio::time::Instant::now();
        let report = context.manager_report(
            system::MANAGER_HEALTH_PROPERTY,
            HealthState::Error,
            "1 observer faulted",
            Duration::from_secs(60),
        );
        context.emit(report).await;
        context.flush().await;
        assert_eq!(started.elapsed(), defaults::REPORT_SINK_TIMEOUT * 2);

        let errors = telemetry.0.lock().clone();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("ObserverManagerHealth"));
        assert!(errors[0].contains("did not respond"));
        assert!(errors[1].contains("flush"));
    }
}
