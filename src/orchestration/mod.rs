//! # Orchestration Engine
//!
//! Observer scheduling and health escalation.
//!
//! ## Core Components
//!
//! - **ObserverManager** (`scheduler`): the Scheduler Loop. Owns the run
//!   cadence, the registry, pass-level fault aggregation and the shutdown path.
//! - **TimeoutGuard**: runs one observer under a hard budget and abandons it
//!   on expiry.
//! - **ReloadCoordinator**: applies configuration snapshots between passes
//!   using a pause/apply/resume protocol.
//! - **ShutdownCoordinator**: `Running → ShutdownRequested → Draining → Stopped`.
//! - **EngineContext**: shared collaborators, built once and passed explicitly.
//!
//! Data flow:
//!
//! ```text
//! ObserverManager ─▶ TimeoutGuard ─▶ Observer::observe
//!        │                                   │
//!        ▼                                   ▼
//!   HealthReporter ◀──────────────── HealthTracker
//!
//! ReloadCoordinator ◀─ mpsc<SettingsSnapshot> (gates the registry between passes)
//! ```

pub mod context;
pub mod reload;
pub mod scheduler;
pub mod shutdown;
pub mod timeout_guard;

pub use context::{EngineContext, EngineContextBuilder};
pub use reload::{PauseGate, ReloadCoordinator, ReloadSummary};
pub use scheduler::{compute_report_ttl, ManagerStatus, ObserverManager, PassSummary};
pub use shutdown::{CancellationSignal, ShutdownCoordinator, ShutdownState};
pub use timeout_guard::{RunOutcome, RunStatus, TimeoutGuard};
