//! YAGPDB process runner.
//!
//! Resolves which top-level services to run from CLI flags, initializes the
//! shared infrastructure and the plugin set, launches the bot connection, web
//! server and feed pollers as independent tasks, and shuts them down in a
//! fixed order on SIGINT/SIGTERM.

// Entry surface
pub mod cli;
pub mod config;

// Core
pub mod commands;
pub mod common;
pub mod lifecycle;
pub mod plugins;
pub mod subsystems;

// Cross-cutting concerns
pub mod observability;
pub mod resilience;

pub use config::AppConfig;
pub use lifecycle::{RunMode, ShutdownCoordinator};
pub use plugins::PluginRegistry;
