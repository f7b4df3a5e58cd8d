//! # Observer Registry
//!
//! Ordered set of [`ObserverRegistration`]s the scheduler walks on each pass.
//!
//! The registry is only mutated by the scheduler (run bookkeeping, permanent
//! disable) and by the reload coordinator (`commit`). Both go through the same
//! async mutex, so the two never interleave.
//!
//! Reloads are two-phase: [`ObserverRegistry::plan_reload`] builds a complete
//! replacement list from fresh observer instances without touching the live
//! one, and [`ObserverRegistry::commit`] swaps it in.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::catalog::ObserverCatalog;
use super::Observer;
use crate::config::SettingsSnapshot;
use crate::error::{ObserverError, Result};

/// Scheduling state for one observer
#[derive(Clone)]
pub struct ObserverRegistration {
    observer: Arc<dyn Observer>,
    pub enabled: bool,
    /// Skip the observer while its last run is newer than this
    pub run_interval_minimum: Duration,
    pub execution_timeout: Duration,
    /// Set once after a timeout; never cleared
    pub permanently_disabled: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_run_duration: Duration,
    last_started: Option<Instant>,
}

impl fmt::Debug for ObserverRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistration")
            .field("name", &self.name())
            .field("enabled", &self.enabled)
            .field("run_interval_minimum", &self.run_interval_minimum)
            .field("execution_timeout", &self.execution_timeout)
            .field("permanently_disabled", &self.permanently_disabled)
            .field("last_run_at", &self.last_run_at)
            .field("last_run_duration", &self.last_run_duration)
            .finish()
    }
}

impl ObserverRegistration {
    pub fn new(observer: Arc<dyn Observer>, default_timeout: Duration) -> Self {
        let settings = observer.settings();
        Self {
            enabled: settings.enabled,
            run_interval_minimum: settings.run_interval_minimum(),
            execution_timeout: settings.execution_timeout(default_timeout),
            permanently_disabled: false,
            last_run_at: None,
            last_run_duration: Duration::ZERO,
            last_started: None,
            observer,
        }
    }

    pub fn name(&self) -> &str {
        self.observer.name()
    }

    pub fn observer(&self) -> Arc<dyn Observer> {
        Arc::clone(&self.observer)
    }

    /// Enabled and not permanently disabled
    pub fn is_schedulable(&self) -> bool {
        self.enabled && !self.permanently_disabled
    }

    /// False while the previous run started less than `run_interval_minimum` ago
    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_started {
            Some(started) => now.saturating_duration_since(started) >= self.run_interval_minimum,
            None => true,
        }
    }

    pub fn mark_run(&mut self, started: Instant, elapsed: Duration) {
        self.last_started = Some(started);
        self.last_run_at = Some(Utc::now());
        self.last_run_duration = elapsed;
    }

    pub fn status(&self) -> ObserverStatus {
        ObserverStatus {
            name: self.name().to_string(),
            enabled: self.enabled,
            permanently_disabled: self.permanently_disabled,
            run_interval_minimum: self.run_interval_minimum,
            execution_timeout: self.execution_timeout,
            last_run_at: self.last_run_at,
            last_run_duration: self.last_run_duration,
        }
    }
}

/// Read-only view of one registration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObserverStatus {
    pub name: String,
    pub enabled: bool,
    pub permanently_disabled: bool,
    pub run_interval_minimum: Duration,
    pub execution_timeout: Duration,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_run_duration: Duration,
}

/// Result of planning a reload, ready to [`commit`](ObserverRegistry::commit)
#[derive(Debug)]
pub struct ReloadPlan {
    registrations: Vec<ObserverRegistration>,
    pub updated: Vec<String>,
    pub added: Vec<String>,
    pub deactivated: Vec<String>,
}

#[derive(Debug)]
pub struct ObserverRegistry {
    registrations: Vec<ObserverRegistration>,
    permanently_disabled: BTreeSet<String>,
    default_timeout: Duration,
}

impl ObserverRegistry {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            registrations: Vec::new(),
            permanently_disabled: BTreeSet::new(),
            default_timeout,
        }
    }

    /// Register every catalog observer that has a section in `snapshot`,
    /// in catalog order.
    pub fn from_catalog(
        catalog: &ObserverCatalog,
        snapshot: &SettingsSnapshot,
        default_timeout: Duration,
    ) -> Result<Self> {
        let mut registry = Self::new(default_timeout);

        for name in catalog.names() {
            let Some(settings) = snapshot.get(name) else {
                debug!(observer = %name, "No settings section, observer not registered");
                continue;
            };
            if let Some(observer) = catalog.create(name, settings) {
                registry.register(observer?)?;
            }
        }

        for name in snapshot.names().filter(|n| !catalog.contains(n)) {
            warn!(observer = %name, "Settings section names an unknown observer, ignoring");
        }

        info!(
            registered = registry.len(),
            observers = ?registry.names(),
            "📋 REGISTRY: Observers registered"
        );
        Ok(registry)
    }

    pub fn register(&mut self, observer: Arc<dyn Observer>) -> Result<()> {
        if self.get(observer.name()).is_some() {
            return Err(ObserverError::SchedulerFault(format!(
                "observer {} registered twice",
                observer.name()
            )));
        }
        let mut registration = ObserverRegistration::new(observer, self.default_timeout);
        registration.permanently_disabled =
            self.permanently_disabled.contains(registration.name());
        self.registrations.push(registration);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObserverRegistration> {
        self.registrations.iter()
    }

    /// Names in registration order
    pub fn names(&self) -> Vec<String> {
        self.registrations
            .iter()
            .map(|r| r.name().to_string())
            .collect()
    }

    /// Status of every registration, in registration order
    pub fn statuses(&self) -> Vec<ObserverStatus> {
        self.registrations.iter().map(|r| r.status()).collect()
    }

    /// Names that a pass should consider, in registration order
    pub fn schedulable_names(&self) -> Vec<String> {
        self.registrations
            .iter()
            .filter(|r| r.is_schedulable())
            .map(|r| r.name().to_string())
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&ObserverRegistration> {
        self.registrations.iter().find(|r| r.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ObserverRegistration> {
        self.registrations.iter_mut().find(|r| r.name() == name)
    }

    pub fn is_permanently_disabled(&self, name: &str) -> bool {
        self.permanently_disabled.contains(name)
    }

    /// Exclude `name` from scheduling for the rest of the process.
    /// Returns false if it was already disabled.
    pub fn disable_permanently(&mut self, name: &str) -> bool {
        let newly_disabled = self.permanently_disabled.insert(name.to_string());
        if let Some(registration) = self.get_mut(name) {
            registration.permanently_disabled = true;
        }
        newly_disabled
    }

    /// Check the registry's own invariants. A failure here is an engine defect.
    pub fn validate(&self) -> Result<()> {
        Self::validate_registrations(&self.registrations, &self.permanently_disabled)
    }

    fn validate_registrations(
        registrations: &[ObserverRegistration],
        permanently_disabled: &BTreeSet<String>,
    ) -> Result<()> {
        let mut seen = HashSet::with_capacity(registrations.len());
        for registration in registrations {
            if !seen.insert(registration.name()) {
                return Err(ObserverError::SchedulerFault(format!(
                    "duplicate registration for observer {}",
                    registration.name()
                )));
            }
            if permanently_disabled.contains(registration.name())
                && !registration.permanently_disabled
            {
                return Err(ObserverError::SchedulerFault(format!(
                    "observer {} lost its permanently disabled flag",
                    registration.name()
                )));
            }
        }
        Ok(())
    }

    /// Build the registration list `snapshot` describes without touching the
    /// live one.
    ///
    /// - registered observers named in the snapshot get a fresh instance via
    ///   [`Observer::update_settings`] and keep their position
    /// - registered observers missing from the snapshot are kept but disabled
    /// - catalog observers new in the snapshot are appended in name order
    pub fn plan_reload(
        &self,
        snapshot: &SettingsSnapshot,
        catalog: &ObserverCatalog,
    ) -> Result<ReloadPlan> {
        snapshot.validate()?;

        let mut registrations = Vec::with_capacity(self.registrations.len());
        let mut updated = Vec::new();
        let mut deactivated = Vec::new();

        for current in &self.registrations {
            let name = current.name();
            let mut next = match snapshot.get(name) {
                Some(settings) => {
                    let observer = current.observer.update_settings(settings)?;
                    if observer.name() != name {
                        return Err(ObserverError::ConfigurationError(format!(
                            "observer {name} renamed itself to {} while applying settings",
                            observer.name()
                        )));
                    }
                    updated.push(name.to_string());
                    ObserverRegistration::new(observer, self.default_timeout)
                }
                None => {
                    deactivated.push(name.to_string());
                    let mut kept = ObserverRegistration::new(current.observer(), self.default_timeout);
                    kept.enabled = false;
                    kept
                }
            };
            next.permanently_disabled = self.permanently_disabled.contains(name);
            registrations.push(next);
        }

        let mut added = Vec::new();
        for name in snapshot.names() {
            if self.get(name).is_some() {
                continue;
            }
            let Some(settings) = snapshot.get(name) else {
                continue;
            };
            match catalog.create(name, settings) {
                Some(observer) => {
                    let mut next = ObserverRegistration::new(observer?, self.default_timeout);
                    next.permanently_disabled = self.permanently_disabled.contains(name);
                    registrations.push(next);
                    added.push(name.to_string());
                }
                None => {
                    warn!(observer = %name, "Reload names an unknown observer, ignoring");
                }
            }
        }

        Self::validate_registrations(&registrations, &self.permanently_disabled)?;

        Ok(ReloadPlan {
            registrations,
            updated,
            added,
            deactivated,
        })
    }

    /// Swap in a planned registration list
    pub fn commit(&mut self, plan: ReloadPlan) -> Result<()> {
        Self::validate_registrations(&plan.registrations, &self.permanently_disabled)?;
        self.registrations = plan.registrations;
        info!(
            updated = plan.updated.len(),
            added = ?plan.added,
            deactivated = ?plan.deactivated,
            active = self.schedulable_names().len(),
            "📋 REGISTRY: Reload committed"
        );
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn push_unchecked(&mut self, registration: ObserverRegistration) {
        self.registrations.push(registration);
    }
}
