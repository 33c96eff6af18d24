//! Top-level subsystems.
//!
//! # Data Flow
//! ```text
//! lifecycle/launcher.rs
//!     → SubsystemProvider builds each selected subsystem
//!         - bot.rs   (gateway connection, command dispatch)
//!         - web.rs   (HTTP server)
//!         - feeds.rs (feed pollers)
//!     → run() spawned as an independent task
//!
//! lifecycle/shutdown.rs
//!     → stop() on each running subsystem
//!     → wait for its run() task to return
//! ```
//!
//! # Design Decisions
//! - Subsystems never touch each other; they share only the frozen registry,
//!   the compiled command set, the pool, the store and the queues
//! - `run()` returns only after `stop()` (or a fatal error)
//! - `stop()` is idempotent

pub mod bot;
pub mod feeds;
pub mod web;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::AppConfig;
use crate::lifecycle::startup::Dependencies;

/// Which top-level service a subsystem is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubsystemKind {
    BotConnection,
    WebServer,
    FeedPool,
}

impl SubsystemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubsystemKind::BotConnection => "bot",
            SubsystemKind::WebServer => "web",
            SubsystemKind::FeedPool => "feeds",
        }
    }
}

impl fmt::Display for SubsystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SubsystemError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("gateway error: {0}")]
    Gateway(String),

    #[error("no known feeds among {0:?}")]
    NoFeeds(Vec<String>),

    #[error("{0}")]
    Other(String),
}

/// A long-running top-level service.
#[async_trait]
pub trait Subsystem: Send + Sync + 'static {
    fn kind(&self) -> SubsystemKind;

    /// Run until stopped.
    async fn run(self: Arc<Self>) -> Result<(), SubsystemError>;

    /// Ask the subsystem to finish. Safe to call more than once.
    async fn stop(&self) -> Result<(), SubsystemError>;
}

/// Builds subsystems for the launcher.
pub trait SubsystemProvider: Send + Sync {
    fn bot(&self) -> Result<Arc<dyn Subsystem>, SubsystemError>;
    fn web(&self) -> Result<Arc<dyn Subsystem>, SubsystemError>;
    fn feeds(&self, names: &BTreeSet<String>) -> Result<Arc<dyn Subsystem>, SubsystemError>;
}

/// Provider for the real subsystems, wired to the initialized dependencies.
pub struct ServiceProvider {
    deps: Arc<Dependencies>,
    config: Arc<AppConfig>,
}

impl ServiceProvider {
    pub fn new(deps: Arc<Dependencies>, config: Arc<AppConfig>) -> Self {
        Self { deps, config }
    }
}

impl SubsystemProvider for ServiceProvider {
    fn bot(&self) -> Result<Arc<dyn Subsystem>, SubsystemError> {
        Ok(Arc::new(bot::BotConnection::new(
            self.config.bot.clone(),
            self.deps.clone(),
        )?))
    }

    fn web(&self) -> Result<Arc<dyn Subsystem>, SubsystemError> {
        Ok(Arc::new(web::WebServer::new(
            self.config.web.clone(),
            self.deps.clone(),
        )?))
    }

    fn feeds(&self, names: &BTreeSet<String>) -> Result<Arc<dyn Subsystem>, SubsystemError> {
        Ok(Arc::new(feeds::FeedPool::new(
            names,
            &self.config.feeds,
            self.deps.clone(),
        )?))
    }
}
