//! Resilience helpers.
//!
//! # Data Flow
//! ```text
//! Bot gateway disconnect / feed poll failure:
//!     → backoff.rs (next delay from consecutive failure count)
//!     → sleep, racing the subsystem's stop signal
//! ```
//!
//! # Design Decisions
//! - Jitter avoids reconnect stampedes after a shared outage
//! - A stop signal always wins over a pending backoff sleep

pub mod backoff;

pub use backoff::BackoffPolicy;
