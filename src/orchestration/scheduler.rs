//! # Scheduler Loop
//!
//! [`ObserverManager`] drives observer execution. One pass walks the
//! registry in registration order and runs each due observer through the
//! [`TimeoutGuard`], strictly one at a time:
//!
//! - completed runs feed the [`HealthTracker`](crate::health::HealthTracker)
//! - faults are recorded and the pass continues
//! - timeouts permanently disable the observer and raise a management report
//! - cancellation discards the in-flight result and ends the loop
//!
//! The registry lock is held for the whole pass, so a reload can only land at
//! a pass boundary. Between passes the loop sleeps for `loop_sleep`, waking
//! immediately on shutdown.

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::context::EngineContext;
use super::reload::{publish_view, PauseGate, ReloadCoordinator};
use super::shutdown::{CancellationSignal, ShutdownState};
use super::timeout_guard::{RunStatus, TimeoutGuard};
use crate::config::SettingsSnapshot;
use crate::constants::{defaults, system, HealthState};
use crate::error::{ObserverError, Result};
use crate::health::Transition;
use crate::logging::log_manager_operation;
use crate::observer::{ObserverRegistry, ObserverStatus};

/// Counters and views shared between the scheduler and the reload coordinator
#[derive(Debug, Default)]
pub(crate) struct ManagerShared {
    epoch: AtomicU64,
    reload_generation: AtomicU64,
    pub(crate) pause: PauseGate,
    pub(crate) view: RwLock<Vec<ObserverStatus>>,
    last_pass: RwLock<Option<PassSummary>>,
}

impl ManagerShared {
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub(crate) fn reload_generation(&self) -> u64 {
        self.reload_generation.load(Ordering::SeqCst)
    }

    pub(crate) fn bump_reload_generation(&self) -> u64 {
        self.reload_generation.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Outcome of one pass over the registry
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PassSummary {
    pub epoch: u64,
    /// Observers that completed within budget
    pub executed: Vec<String>,
    /// Observers skipped because their run interval had not elapsed
    pub skipped: Vec<String>,
    /// Observers that returned an error or panicked, with the reason
    pub faults: Vec<(String, String)>,
    pub timed_out: Vec<String>,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl PassSummary {
    fn new(epoch: u64) -> Self {
        Self {
            epoch,
            ..Self::default()
        }
    }

    pub fn all_executed(&self) -> bool {
        self.faults.is_empty()
    }
}

/// Read-only view of the manager for collaborators
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagerStatus {
    pub node_name: String,
    pub epoch: u64,
    pub reload_generation: u64,
    pub shutdown_state: ShutdownState,
    pub paused: bool,
    pub observers: Vec<ObserverStatus>,
    pub last_pass: Option<PassSummary>,
}

/// Lifetime for an observer's issue report.
///
/// Without an explicit TTL the report must outlive the gap until the observer
/// next runs: the inter-pass sleep, its own run interval and its last run time.
pub fn compute_report_ttl(
    explicit: Option<Duration>,
    loop_sleep: Duration,
    run_interval_minimum: Duration,
    last_run_duration: Duration,
) -> Duration {
    let minimum = Duration::from_secs(defaults::MINIMUM_REPORT_TTL_SECONDS);
    explicit
        .unwrap_or_else(|| {
            loop_sleep
                .saturating_add(run_interval_minimum)
                .saturating_add(last_run_duration)
        })
        .max(minimum)
}

pub struct ObserverManager {
    context: Arc<EngineContext>,
    registry: Arc<Mutex<ObserverRegistry>>,
    shared: Arc<ManagerShared>,
    guard: TimeoutGuard,
    aggregate_issue_active: AtomicBool,
}

impl ObserverManager {
    /// Register the catalog observers named in `snapshot`
    pub fn new(context: Arc<EngineContext>, snapshot: &SettingsSnapshot) -> Result<Self> {
        snapshot.validate()?;
        let registry = ObserverRegistry::from_catalog(
            &context.catalog,
            snapshot,
            context.manager.execution_timeout(),
        )?;
        Self::with_registry(context, registry)
    }

    pub fn with_registry(context: Arc<EngineContext>, registry: ObserverRegistry) -> Result<Self> {
        registry.validate()?;
        let shared = Arc::new(ManagerShared::default());
        publish_view(&shared.view, &registry);

        Ok(Self {
            guard: TimeoutGuard::new(context.manager.shutdown_drain_timeout()),
            context,
            registry: Arc::new(Mutex::new(registry)),
            shared,
            aggregate_issue_active: AtomicBool::new(false),
        })
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.context
    }

    /// Coordinator that applies snapshots to this manager's registry
    pub fn reload_coordinator(&self) -> ReloadCoordinator {
        ReloadCoordinator::new(
            Arc::clone(&self.context),
            Arc::clone(&self.registry),
            Arc::clone(&self.shared),
        )
    }

    /// Spawn the reload coordinator and return the sender side of its channel
    pub fn spawn_reload_coordinator(&self) -> (mpsc::Sender<SettingsSnapshot>, tokio::task::JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(defaults::RELOAD_CHANNEL_CAPACITY);
        let coordinator = self.reload_coordinator();
        let handle = tokio::spawn(async move { coordinator.run(receiver).await });
        (sender, handle)
    }

    pub fn epoch(&self) -> u64 {
        self.shared.epoch()
    }

    pub fn status(&self) -> ManagerStatus {
        ManagerStatus {
            node_name: self.context.node_name().to_string(),
            epoch: self.shared.epoch(),
            reload_generation: self.shared.reload_generation(),
            shutdown_state: self.context.shutdown.state(),
            paused: self.shared.pause.is_paused(),
            observers: self.shared.view.read().clone(),
            last_pass: self.shared.last_pass.read().clone(),
        }
    }

    /// Run passes until shutdown or a scheduler fault.
    ///
    /// Always ends in [`ShutdownState::Stopped`] with reports flushed. Returns
    /// `Err` only for a scheduler fault, which the caller should treat as fatal.
    pub async fn run(&self) -> Result<()> {
        if self.context.shutdown.state() == ShutdownState::Stopped {
            return Err(ObserverError::InvalidState(
                "observer manager already stopped".to_string(),
            ));
        }

        let signal = self.context.shutdown.signal();
        info!(
            node = %self.context.node_name(),
            instance_id = %self.context.instance_id,
            loop_sleep_secs = self.context.manager.loop_sleep().as_secs(),
            "🚀 SCHEDULER: Observer manager starting"
        );

        let result = self.run_passes(&signal).await;

        if let Err(fault) = &result {
            let message = format!(
                "Unhandled fault in {} on node {}, stopping: {fault}",
                system::OBSERVER_MANAGER_NAME,
                self.context.node_name()
            );
            error!(error = %fault, "💥 SCHEDULER: {}", message);
            self.context.telemetry.log_error(&message);
            let report = self.context.manager_report(
                system::MANAGER_FATAL_PROPERTY,
                HealthState::Error,
                message,
                defaults::PERMANENT_REPORT_TTL,
            );
            self.context.emit(report).await;
            self.context.shutdown.request_shutdown("scheduler fault");
        }

        self.stop().await;
        result
    }

    async fn run_passes(&self, signal: &CancellationSignal) -> Result<()> {
        loop {
            if signal.is_cancelled() {
                return Ok(());
            }
            if !self.shared.pause.wait_while_paused(signal).await {
                return Ok(());
            }

            let summary = self.run_pass(signal).await?;
            if self.context.manager.enable_verbose_logging {
                info!(
                    epoch = summary.epoch,
                    executed = ?summary.executed,
                    skipped = ?summary.skipped,
                    faults = summary.faults.len(),
                    timed_out = ?summary.timed_out,
                    elapsed_ms = summary.elapsed.as_millis() as u64,
                    "📋 SCHEDULER: Pass finished"
                );
            }
            let cancelled = summary.cancelled;
            *self.shared.last_pass.write() = Some(summary.clone());

            if cancelled {
                debug!(epoch = summary.epoch, "Pass interrupted by shutdown");
                return Ok(());
            }

            self.report_pass(&summary).await;

            if !signal.sleep(self.context.manager.loop_sleep()).await {
                return Ok(());
            }
        }
    }

    /// Execute one pass. `Err` means the engine's own bookkeeping is broken.
    async fn run_pass(&self, signal: &CancellationSignal) -> Result<PassSummary> {
        let mut registry = self.registry.lock().await;
        registry.validate()?;

        let generation = self.shared.reload_generation();
        let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let pass_started = Instant::now();
        let mut summary = PassSummary::new(epoch);
        let tracker = &self.context.tracker;

        for name in registry.schedulable_names() {
            if !self.context.shutdown.invocation_permitted() {
                summary.cancelled = true;
                break;
            }

            let registration = registry.get(&name).ok_or_else(|| {
                ObserverError::SchedulerFault(format!("observer {name} vanished mid-pass"))
            })?;

            let now = Instant::now();
            if !registration.is_due(now) {
                debug!(observer = %name, epoch = epoch, "Run interval not elapsed, skipping");
                summary.skipped.push(name);
                continue;
            }

            let observer = registration.observer();
            let budget = registration.execution_timeout;
            let run_id = tracker.begin_run(&name);
            let outcome = self.guard.execute(observer, budget, run_id, signal).await;

            match outcome.status {
                RunStatus::Completed(observation) => {
                    let registration = registry.get_mut(&name).ok_or_else(|| {
                        ObserverError::SchedulerFault(format!("observer {name} vanished mid-pass"))
                    })?;
                    registration.mark_run(now, outcome.elapsed);
                    let ttl = compute_report_ttl(
                        registration.observer().settings().health_report_ttl(),
                        self.context.manager.loop_sleep(),
                        registration.run_interval_minimum,
                        registration.last_run_duration,
                    );

                    let transition = tracker
                        .record(&name, run_id, &observation, ttl)
                        .map_err(|e| ObserverError::SchedulerFault(e.to_string()))?;
                    self.publish_transition(&name, transition).await;
                    summary.executed.push(name);
                }
                RunStatus::Faulted(fault) => {
                    tracker.abandon_run(&name, run_id);
                    if let Some(registration) = registry.get_mut(&name) {
                        registration.mark_run(now, outcome.elapsed);
                    }
                    warn!(observer = %name, error = %fault, "Observer faulted, continuing pass");
                    summary.faults.push((name, fault.to_string()));
                }
                RunStatus::TimedOut => {
                    tracker.abandon_run(&name, run_id);
                    registry.disable_permanently(&name);
                    self.report_timeout(&name, budget).await;
                    summary.timed_out.push(name);
                }
                RunStatus::Cancelled => {
                    tracker.abandon_run(&name, run_id);
                    summary.cancelled = true;
                    break;
                }
            }
        }

        if self.shared.reload_generation() != generation {
            return Err(ObserverError::SchedulerFault(format!(
                "registry reloaded during pass {epoch}"
            )));
        }

        summary.elapsed = pass_started.elapsed();
        publish_view(&self.shared.view, &registry);
        Ok(summary)
    }

    async fn publish_transition(&self, name: &str, transition: Transition) {
        match transition {
            Transition::Raised(record) => {
                self.context.telemetry.log_warning(&format!(
                    "{name}: {} detected. {}",
                    record.state, record.message
                ));
                let report = self.context.observer_report(name, &record);
                self.context.emit(report).await;
            }
            Transition::Cleared(record) => {
                let report = self.context.observer_report(name, &record);
                self.context.emit(report).await;
            }
            Transition::Unchanged => {}
        }
    }

    async fn report_timeout(&self, name: &str, budget: Duration) {
        let message = format!(
            "{name} has exceeded its specified run time of {} seconds. \
             It will not be run again for the lifetime of this agent.",
            budget.as_secs_f64()
        );
        error!(observer = %name, budget_ms = budget.as_millis() as u64, "⏱️ SCHEDULER: {}", message);
        self.context.telemetry.log_error(&message);

        let report = self.context.manager_report(
            system::timeout_property(name),
            HealthState::Error,
            message,
            defaults::PERMANENT_REPORT_TTL,
        );
        self.context.emit(report).await;
    }

    async fn report_pass(&self, summary: &PassSummary) {
        if summary.all_executed() {
            self.context
                .telemetry
                .log_info(system::ALL_OBSERVERS_EXECUTED_MESSAGE);
            log_manager_operation("pass", Some(summary.epoch), "completed", None);

            if self.aggregate_issue_active.swap(false, Ordering::SeqCst) {
                let report = self.context.manager_report(
                    system::MANAGER_HEALTH_PROPERTY,
                    HealthState::Ok,
                    system::ALL_OBSERVERS_EXECUTED_MESSAGE,
                    Duration::ZERO,
                );
                self.context.emit(report).await;
            }
            return;
        }

        let details = summary
            .faults
            .iter()
            .map(|(name, reason)| format!("Fault from {name}: {reason}"))
            .collect::<Vec<_>>()
            .join("\n");
        log_manager_operation("pass", Some(summary.epoch), "faulted", Some(&details));

        let ttl = compute_report_ttl(
            None,
            self.context.manager.loop_sleep(),
            Duration::ZERO,
            summary.elapsed,
        );
        let report = self.context.manager_report(
            system::MANAGER_HEALTH_PROPERTY,
            HealthState::Error,
            details,
            ttl,
        );
        self.context.emit(report).await;
        self.aggregate_issue_active.store(true, Ordering::SeqCst);
    }

    /// Shutdown path: drain, emit the shutdown marker, flush, stop
    async fn stop(&self) {
        let shutdown = &self.context.shutdown;
        shutdown.request_shutdown("observer manager exiting");
        shutdown.begin_draining();

        let report = self.context.manager_report(
            system::MANAGER_SHUTDOWN_PROPERTY,
            HealthState::Ok,
            format!("{} stopping", system::OBSERVER_MANAGER_NAME),
            Duration::ZERO,
        );
        self.context.emit(report).await;
        self.context.flush().await;

        shutdown.mark_stopped();
        log_manager_operation("stop", Some(self.shared.epoch()), "stopped", None);
    }

    #[cfg(test)]
    pub(crate) fn registry(&self) -> &Arc<Mutex<ObserverRegistry>> {
        &self.registry
    }
}
