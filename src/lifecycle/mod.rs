//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Bind listener → Spawn accept task → Probe /healthz until 200 → Ready
//!
//! Shutdown (shutdown.rs):
//!     Trigger fires → begin hooks → cleanup callbacks (in order) → end hooks
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → ShutdownCoordinator::begin_shutdown → exit(0) as the last step
//! ```
//!
//! # Design Decisions
//! - Triggers are pluggable; the coordinator never knows which one fired
//! - Shutdown runs once; concurrent triggers are ignored
//! - Both startup and shutdown waits are bounded by deadlines

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{
    CleanupError, CleanupOutcome, CleanupStatus, ShutdownCoordinator, ShutdownError,
    ShutdownReport, ShutdownTrigger, TriggerError,
};
pub use signals::{ShutdownSignal, SignalTrigger};
pub use startup::{ReadinessProbe, StartupError};
