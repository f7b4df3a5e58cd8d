//! Shared fixtures for the engine integration tests: a scripted observer whose
//! behaviour is set per run, an invocation log and a recording telemetry sink.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use observer_core::config::{ManagerConfig, ObserverSettings, SettingsSnapshot};
use observer_core::constants::HealthState;
use observer_core::error::{ObserverError, Result};
use observer_core::health::MemoryHealthReporter;
use observer_core::logging::TelemetrySink;
use observer_core::observer::{Finding, Observation, Observer, ObserverCatalog};
use observer_core::orchestration::{CancellationSignal, EngineContext, ObserverManager};

/// Settings parameter the scripted observer records on every invocation
pub const VERSION_KEY: &str = "version";
/// Settings parameter that makes `update_settings` fail
pub const REJECT_KEY: &str = "reject";

/// What one run of a [`ScriptedObserver`] does
#[derive(Debug, Clone)]
pub enum Step {
    /// Return immediately with a single finding
    Report(HealthState, &'static str),
    /// Sleep cooperatively (returns `Cancelled` on shutdown), then report Ok
    Sleep(Duration),
    /// Sleep ignoring the cancellation signal, then report Ok
    Hang(Duration),
    Fail(&'static str),
    /// Return `Cancelled` from an internal operation while no shutdown is pending
    GiveUp(&'static str),
    Panic(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Started,
    Finished,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct Invocation {
    pub observer: String,
    pub event: Event,
    pub version: Option<String>,
    pub at: Instant,
}

/// Ordered record of observer activity, shared by every scripted observer in a test
#[derive(Debug, Default)]
pub struct InvocationLog {
    entries: Mutex<Vec<Invocation>>,
}

impl InvocationLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, observer: &str, event: Event, version: Option<&str>) {
        self.entries.lock().push(Invocation {
            observer: observer.to_string(),
            event,
            version: version.map(str::to_string),
            at: Instant::now(),
        });
    }

    pub fn entries(&self) -> Vec<Invocation> {
        self.entries.lock().clone()
    }

    /// Observer names in the order their runs started
    pub fn started(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.event == Event::Started)
            .map(|e| e.observer.clone())
            .collect()
    }

    pub fn starts_of(&self, observer: &str) -> usize {
        self.started().iter().filter(|n| *n == observer).count()
    }

    /// Settings versions seen by each started run of `observer`
    pub fn versions_of(&self, observer: &str) -> Vec<Option<String>> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.event == Event::Started && e.observer == observer)
            .map(|e| e.version.clone())
            .collect()
    }
}

/// Observer whose runs follow a script; once the script is exhausted every
/// run reports Ok.
#[derive(Clone)]
pub struct ScriptedObserver {
    name: String,
    settings: ObserverSettings,
    script: Arc<Mutex<VecDeque<Step>>>,
    log: Arc<InvocationLog>,
}

impl ScriptedObserver {
    pub fn new(name: &str, steps: Vec<Step>, log: &Arc<InvocationLog>) -> Self {
        Self {
            name: name.to_string(),
            settings: ObserverSettings::default(),
            script: Arc::new(Mutex::new(steps.into())),
            log: Arc::clone(log),
        }
    }

    pub fn with_settings(&self, settings: &ObserverSettings) -> Self {
        Self {
            settings: settings.clone(),
            ..self.clone()
        }
    }

    fn next_step(&self) -> Step {
        self.script
            .lock()
            .pop_front()
            .unwrap_or(Step::Report(HealthState::Ok, "No issues detected"))
    }

    fn finish(&self, observation: Observation) -> Result<Observation> {
        self.log.push(&self.name, Event::Finished, self.version());
        Ok(observation)
    }

    fn version(&self) -> Option<&str> {
        self.settings.parameter(VERSION_KEY)
    }
}

#[async_trait]
impl Observer for ScriptedObserver {
    fn name(&self) -> &str {
        &self.name
    }

    fn settings(&self) -> &ObserverSettings {
        &self.settings
    }

    async fn observe(&self, signal: CancellationSignal) -> Result<Observation> {
        self.log.push(&self.name, Event::Started, self.version());

        match self.next_step() {
            Step::Report(state, message) => {
                self.finish(Observation::from_findings(vec![Finding::new(state, message)]))
            }
            Step::Sleep(duration) => {
                if !signal.sleep(duration).await {
                    self.log.push(&self.name, Event::Cancelled, self.version());
                    return Err(ObserverError::Cancelled(format!("{} interrupted", self.name)));
                }
                self.finish(Observation::healthy())
            }
            Step::Hang(duration) => {
                tokio::time::sleep(duration).await;
                self.finish(Observation::healthy())
            }
            Step::Fail(reason) => Err(ObserverError::observer_fault(&self.name, reason)),
            Step::GiveUp(operation) => Err(ObserverError::Cancelled(operation.to_string())),
            Step::Panic(message) => panic!("{}", message),
        }
    }

    fn update_settings(&self, settings: &ObserverSettings) -> Result<Arc<dyn Observer>> {
        if settings.parameter(REJECT_KEY).is_some() {
            return Err(ObserverError::ConfigurationError(format!(
                "{} rejected its new settings",
                self.name
            )));
        }
        Ok(Arc::new(self.with_settings(settings)))
    }
}

/// Catalog whose factories hand out the given scripted observers
pub fn scripted_catalog(observers: &[ScriptedObserver]) -> ObserverCatalog {
    let mut catalog = ObserverCatalog::new();
    for observer in observers {
        let template = observer.clone();
        catalog.register(observer.name.clone(), move |settings: &ObserverSettings| {
            Ok(Arc::new(template.with_settings(settings)) as Arc<dyn Observer>)
        });
    }
    catalog
}

/// Telemetry sink that keeps every notice
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    entries: Mutex<Vec<(&'static str, String)>>,
}

impl RecordingTelemetry {
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        self.entries.lock().clone()
    }

    pub fn at_level(&self, level: &str) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl TelemetrySink for RecordingTelemetry {
    fn log_info(&self, message: &str) {
        self.entries.lock().push(("info", message.to_string()));
    }

    fn log_warning(&self, message: &str) {
        self.entries.lock().push(("warning", message.to_string()));
    }

    fn log_error(&self, message: &str) {
        self.entries.lock().push(("error", message.to_string()));
    }
}

/// A manager wired to in-memory sinks
pub struct Harness {
    pub manager: Arc<ObserverManager>,
    pub context: Arc<EngineContext>,
    pub reporter: Arc<MemoryHealthReporter>,
    pub telemetry: Arc<RecordingTelemetry>,
}

impl Harness {
    /// Register `observers` (in the given order) with default settings plus
    /// any per-observer overrides in `settings`.
    pub fn new(
        manager: ManagerConfig,
        observers: &[ScriptedObserver],
        settings: HashMap<&str, ObserverSettings>,
    ) -> Self {
        let mut snapshot = SettingsSnapshot::new();
        for observer in observers {
            let section = settings.get(observer.name()).cloned().unwrap_or_default();
            snapshot = snapshot.with_observer(observer.name(), section);
        }
        Self::with_snapshot(manager, observers, &snapshot)
    }

    /// Catalog holds every observer; only those named in `snapshot` are registered
    pub fn with_snapshot(
        manager: ManagerConfig,
        observers: &[ScriptedObserver],
        snapshot: &SettingsSnapshot,
    ) -> Self {
        let reporter = Arc::new(MemoryHealthReporter::new());
        let telemetry = Arc::new(RecordingTelemetry::default());
        let context = EngineContext::builder(manager)
            .health_reporter(reporter.clone())
            .telemetry(telemetry.clone())
            .catalog(scripted_catalog(observers))
            .build();

        let manager = ObserverManager::new(Arc::clone(&context), snapshot)
            .expect("scripted observers register");

        Self {
            manager: Arc::new(manager),
            context,
            reporter,
            telemetry,
        }
    }

    /// Start the scheduler loop in the background
    pub fn spawn_run(&self) -> tokio::task::JoinHandle<Result<()>> {
        let manager = Arc::clone(&self.manager);
        tokio::spawn(async move { manager.run().await })
    }

    pub fn request_shutdown(&self) {
        self.context.shutdown.request_shutdown("test finished");
    }
}

/// Manager settings with a 30s loop and a generous default budget
pub fn manager_config() -> ManagerConfig {
    ManagerConfig {
        node_name: "test-node".to_string(),
        loop_sleep_seconds: 30,
        execution_timeout_seconds: 600,
        ..ManagerConfig::default()
    }
}

pub fn settings_version(version: &str) -> ObserverSettings {
    ObserverSettings::default().with_parameter(VERSION_KEY, version)
}
