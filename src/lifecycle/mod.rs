//! Process lifecycle.
//!
//! # Data Flow
//! ```text
//! Mode (mode.rs):
//!     CLI flags → RunMode (selectors, dry run, pool size)
//!
//! Startup (startup.rs):
//!     Pool → Store → Databases → Plugin hooks → Freeze → Commands → Queue
//!
//! Launch (launcher.rs):
//!     Bot / Web / Feeds as independent tasks, plus the event poller
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     Signal → Stop subsystems → Drain → Grace periods → Exit 0
//! ```
//!
//! # Design Decisions
//! - Nothing is initialized until the run mode resolves
//! - The plugin registry is passed in explicitly and frozen before any
//!   subsystem starts
//! - Shutdown is best-effort: stop errors are logged, the exit code stays 0

pub mod launcher;
pub mod mode;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use launcher::{launch, Launched, SubsystemHandle};
pub use mode::{ConfigurationError, RunMode};
pub use shutdown::{GraceSchedule, ShutdownCoordinator, ShutdownReport, ShutdownSession, ShutdownState};
pub use startup::{initialize, Dependencies, DryRunReport, InitError, Initialized};
