#![allow(clippy::doc_markdown)] // Allow technical terms like sysinfo, meminfo in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Observer Core
//!
//! Health-monitoring agent core: runs pluggable diagnostic checks
//! ("observers") against one node on a fixed cadence, folds their findings
//! into a tri-state health signal and reports it with hysteresis.
//!
//! ## Overview
//!
//! The engine provides:
//!
//! - **Liveness**: every observer runs under a hard budget; a hung observer is
//!   abandoned and permanently disabled instead of stalling the agent.
//! - **Consistency**: configuration reloads only land between passes and are
//!   applied all-or-nothing.
//! - **Idempotent health transitions**: issues are reported with a TTL and
//!   re-affirmed while they persist; recovery produces exactly one clearing
//!   report; steady Ok produces none.
//!
//! ## Module Organization
//!
//! - [`orchestration`] - Scheduler loop, timeout guard, reload and shutdown coordination
//! - [`health`] - Health escalation tracker and outbound reports
//! - [`observer`] - Observer capability, registry and catalog
//! - [`builtin`] - Disk, memory, CPU and OS observers
//! - [`collectors`] - Platform resource collectors
//! - [`config`] - Configuration loading and settings snapshots
//! - [`logging`] - Tracing setup and the telemetry sink
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use observer_core::builtin::builtin_catalog;
//! use observer_core::collectors::create_collector;
//! use observer_core::config::ConfigManager;
//! use observer_core::orchestration::{EngineContext, ObserverManager};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigManager::load()?;
//! let context = EngineContext::builder(config.config().manager.clone())
//!     .catalog(builtin_catalog(create_collector()))
//!     .build();
//!
//! let manager = ObserverManager::new(context.clone(), &config.config().snapshot())?;
//! let (reloads, _reload_task) = manager.spawn_reload_coordinator();
//!
//! // Elsewhere: reloads.send(new_snapshot).await, context.shutdown.request_shutdown("...")
//! manager.run().await?;
//! # drop(reloads);
//! # Ok(())
//! # }
//! ```

pub mod builtin;
pub mod collectors;
pub mod config;
pub mod constants;
pub mod error;
pub mod health;
pub mod logging;
pub mod observer;
pub mod orchestration;

pub use config::{AgentConfig, ConfigManager, ManagerConfig, ObserverSettings, SettingsSnapshot};
pub use constants::{system, HealthState};
pub use error::{ObserverError, Result};
pub use health::{HealthRecord, HealthReport, HealthReporter, HealthTracker};
pub use observer::{Finding, Observation, Observer, ObserverCatalog};
pub use orchestration::{
    CancellationSignal, EngineContext, ManagerStatus, ObserverManager, ShutdownCoordinator,
    ShutdownState,
};
