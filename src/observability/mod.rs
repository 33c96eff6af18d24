//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All components produce:
//!     → tracing events (structured fields)
//!     → metrics.rs (counters, histograms)
//!
//! logging.rs builds the subscriber:
//!     → fmt layer (stdout, optional timestamps)
//!     → syslog.rs layer (-syslog, unix only)
//!     → sentry.rs layer (ERROR events, when YAGPDB_SENTRY_DSN is set)
//! ```
//!
//! # Design Decisions
//! - Logging is initialized before anything else so every failure is reported
//! - Remote error forwarding never blocks the caller
//! - Metrics are cheap (atomic increments) and exporting is opt-in

pub mod logging;
pub mod metrics;
pub mod sentry;
pub mod syslog;
