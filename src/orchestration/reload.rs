//! # Configuration Reload Coordinator
//!
//! Consumes [`SettingsSnapshot`]s pushed by the environment and applies them
//! between passes:
//!
//! 1. close the [`PauseGate`] so the scheduler does not start a new pass
//! 2. take the registry lock, which the scheduler holds for a whole pass; after
//!    the grace period a warning is logged and the wait continues
//! 3. plan the new registration list from fresh observer instances
//! 4. commit it in one swap
//! 5. reopen the gate
//!
//! A failure in step 3 or 4 leaves the previous registrations in place and is
//! reported as a `ConfigurationUpdateError` health event.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, info, warn};

use super::context::EngineContext;
use super::scheduler::ManagerShared;
use super::shutdown::CancellationSignal;
use crate::config::SettingsSnapshot;
use crate::constants::{defaults, system, HealthState};
use crate::error::{ObserverError, Result};
use crate::logging::log_manager_operation;
use crate::observer::{ObserverRegistry, ObserverStatus};

/// Cooperative pause between passes
#[derive(Debug, Default)]
pub struct PauseGate {
    paused: AtomicBool,
    resumed: Notify,
}

impl PauseGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.resumed.notify_waiters();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Wait until the gate is open. Returns `false` if `signal` fired first.
    pub async fn wait_while_paused(&self, signal: &CancellationSignal) -> bool {
        loop {
            let resumed = self.resumed.notified();
            tokio::pin!(resumed);
            resumed.as_mut().enable();
            if signal.is_cancelled() {
                return false;
            }
            if !self.is_paused() {
                return true;
            }
            tokio::select! {
                _ = &mut resumed => {}
                _ = signal.cancelled() => return false,
            }
        }
    }
}

/// What a successful reload changed
#[derive(Debug, Clone, PartialEq)]
pub struct ReloadSummary {
    pub generation: u64,
    pub updated: Vec<String>,
    pub added: Vec<String>,
    pub deactivated: Vec<String>,
}

pub struct ReloadCoordinator {
    context: Arc<EngineContext>,
    registry: Arc<Mutex<ObserverRegistry>>,
    shared: Arc<ManagerShared>,
    config_error_active: AtomicBool,
}

impl ReloadCoordinator {
    pub(crate) fn new(
        context: Arc<EngineContext>,
        registry: Arc<Mutex<ObserverRegistry>>,
        shared: Arc<ManagerShared>,
    ) -> Self {
        Self {
            context,
            registry,
            shared,
            config_error_active: AtomicBool::new(false),
        }
    }

    /// Apply snapshots until the channel closes or shutdown is requested
    pub async fn run(&self, mut snapshots: mpsc::Receiver<SettingsSnapshot>) {
        let signal = self.context.shutdown.signal();
        info!("🔄 RELOAD: Coordinator listening for configuration snapshots");

        loop {
            let snapshot = tokio::select! {
                biased;
                _ = signal.cancelled() => break,
                received = snapshots.recv() => match received {
                    Some(snapshot) => snapshot,
                    None => break,
                },
            };
            // Failures are reported inside apply; the coordinator keeps listening.
            let _ = self.apply(snapshot).await;
        }

        debug!("Reload coordinator stopped");
    }

    /// Apply one snapshot using the pause/apply/resume protocol
    pub async fn apply(&self, snapshot: SettingsSnapshot) -> Result<ReloadSummary> {
        let signal = self.context.shutdown.signal();
        self.shared.pause.pause();
        let result = self.apply_paused(&snapshot, &signal).await;
        self.shared.pause.resume();

        match &result {
            Ok(summary) => {
                log_manager_operation(
                    "reload",
                    Some(self.shared.epoch()),
                    "applied",
                    Some(&format!(
                        "generation {} updated={:?} added={:?} deactivated={:?}",
                        summary.generation, summary.updated, summary.added, summary.deactivated
                    )),
                );
                if self.config_error_active.swap(false, Ordering::SeqCst) {
                    let report = self.context.manager_report(
                        system::CONFIGURATION_ERROR_PROPERTY,
                        HealthState::Ok,
                        "Configuration update applied",
                        std::time::Duration::ZERO,
                    );
                    self.context.emit(report).await;
                }
            }
            Err(error) if error.is_cancellation() => {
                debug!("Reload abandoned because shutdown is in progress");
            }
            Err(error) => {
                let message = format!("Error updating observers with new configuration: {error}");
                self.context.telemetry.log_error(&message);
                let report = self.context.manager_report(
                    system::CONFIGURATION_ERROR_PROPERTY,
                    HealthState::Warning,
                    message,
                    defaults::PERMANENT_REPORT_TTL,
                );
                self.context.emit(report).await;
                self.config_error_active.store(true, Ordering::SeqCst);
            }
        }

        result
    }

    async fn apply_paused(
        &self,
        snapshot: &SettingsSnapshot,
        signal: &CancellationSignal,
    ) -> Result<ReloadSummary> {
        let grace = self.context.manager.reload_grace_period();

        let mut registry = match tokio::time::timeout(grace, self.registry.lock()).await {
            Ok(guard) => guard,
            Err(_) => {
                warn!(
                    grace_ms = grace.as_millis() as u64,
                    "🔄 RELOAD: Pass still in progress after grace period, waiting for pass boundary"
                );
                tokio::select! {
                    guard = self.registry.lock() => guard,
                    _ = signal.cancelled() => {
                        return Err(ObserverError::Cancelled("reload interrupted by shutdown".to_string()));
                    }
                }
            }
        };

        let plan = registry.plan_reload(snapshot, &self.context.catalog)?;
        let updated = plan.updated.clone();
        let added = plan.added.clone();
        let deactivated = plan.deactivated.clone();
        registry.commit(plan)?;

        let generation = self.shared.bump_reload_generation();
        publish_view(&self.shared.view, &registry);

        Ok(ReloadSummary {
            generation,
            updated,
            added,
            deactivated,
        })
    }
}

pub(crate) fn publish_view(view: &RwLock<Vec<ObserverStatus>>, registry: &ObserverRegistry) {
    *view.write() = registry.statuses();
}
