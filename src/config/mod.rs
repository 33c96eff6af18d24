//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! command line (-bot, -web, -feeds, -all, -dry, -syslog, -ts, --config)
//!     → cli.rs (normalize, parse flags)
//!
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize, environment overrides)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → shared by reference with initializer and subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_or_default, ConfigError};
pub use schema::AppConfig;
pub use schema::BotConfig;
pub use schema::FeedConfig;
pub use schema::PoolConfig;
pub use schema::ShutdownConfig;
pub use schema::WebConfig;
