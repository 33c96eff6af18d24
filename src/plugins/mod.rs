//! Plugin subsystem.
//!
//! # Data Flow
//! ```text
//! builtin.rs (explicit, ordered constructor list)
//!     → registry.rs (append in order, reject duplicates)
//!     → lifecycle/startup.rs calls each plugin's register hook in order
//!         → plugin declares store tables, subscribes event handlers
//!     → registry frozen
//!     → commands.rs compiles every plugin's commands
//! ```
//!
//! # Design Decisions
//! - No ambient global registry: the registry is built in `main` and passed
//!   to the initializer
//! - Registration order is significant: later command names shadow earlier
//! - Late registration after the freeze is rejected, not ignored

pub mod builtin;
pub mod registry;

use std::sync::Arc;

use thiserror::Error;

use crate::common::pubsub::{Event, EventBus};
use crate::common::store::{ConfigStore, StoreError};

pub use registry::{PluginRegistry, RegistryError};

/// Optional tags describing what a plugin does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Contributes commands to the command set.
    Commands,
    /// Can migrate its stored per-guild data.
    StorageMigration,
    /// Runs work in the background while the bot is connected.
    BackgroundWorker,
    /// Subscribes to event bus events.
    EventHandler,
}

/// Failure inside a plugin's register hook.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Other(String),
}

/// A command a plugin contributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDef {
    pub name: String,
    pub description: String,
}

impl CommandDef {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// What a plugin may touch while registering.
pub struct RegistrationContext<'a> {
    plugin: &'a str,
    store: &'a ConfigStore,
    events: &'a EventBus,
}

impl<'a> RegistrationContext<'a> {
    pub fn new(plugin: &'a str, store: &'a ConfigStore, events: &'a EventBus) -> Self {
        Self {
            plugin,
            store,
            events,
        }
    }

    /// Declare a config store table owned by the plugin.
    pub fn table(&self, name: &str) -> Result<(), PluginError> {
        self.store.register_table(name)?;
        tracing::debug!(plugin = self.plugin, table = name, "Registered table");
        Ok(())
    }

    /// Subscribe a handler on the event bus.
    pub fn on_event<F>(&self, name: &str, handler: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.events.subscribe(name, handler);
        tracing::debug!(plugin = self.plugin, event = name, "Subscribed to event");
    }
}

/// A self-contained feature module.
pub trait Plugin: Send + Sync {
    /// Unique name within the registry.
    fn name(&self) -> &str;

    fn capabilities(&self) -> &[Capability] {
        &[]
    }

    /// Attach storage, handlers and hooks. Called once, in registry order.
    fn register(&self, ctx: &RegistrationContext<'_>) -> Result<(), PluginError>;

    /// Commands this plugin contributes to the compiled command set.
    fn commands(&self) -> Vec<CommandDef> {
        Vec::new()
    }
}

/// Shared handle to a registered plugin.
pub type PluginHandle = Arc<dyn Plugin>;
