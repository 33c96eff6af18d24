//! Startup orchestration.
//!
//! # Responsibilities
//! - Create the shared resource pool, already sized by the run mode
//! - Connect the config store and initialize its databases
//! - Run every plugin's registration hook, in registration order
//! - Freeze the registry, then compile commands and set up the message queue
//!
//! # Design Decisions
//! - Fail fast: any step's error aborts the rest
//! - A dry run stops after plugin registration and reports what it found
//! - Everything built here is owned for the process lifetime; subsystems
//!   only borrow it

use std::sync::Arc;

use thiserror::Error;

use crate::commands::{CommandSet, CompileError};
use crate::common::{ConfigStore, EventBus, MessageQueue, ResourcePool, StoreError};
use crate::config::AppConfig;
use crate::lifecycle::mode::RunMode;
use crate::plugins::{PluginError, PluginRegistry, RegistrationContext};

#[derive(Debug, Error)]
pub enum InitError {
    #[error("config store: {0}")]
    Store(#[from] StoreError),

    #[error("plugin {plugin:?} failed to register: {source}")]
    Plugin {
        plugin: String,
        #[source]
        source: PluginError,
    },

    #[error("command set: {0}")]
    Compile(#[from] CompileError),
}

/// Shared infrastructure handed to every subsystem.
pub struct Dependencies {
    pub mode: RunMode,
    pub pool: Arc<ResourcePool>,
    pub store: Arc<ConfigStore>,
    pub registry: Arc<PluginRegistry>,
    pub commands: Arc<CommandSet>,
    pub mqueue: Arc<MessageQueue>,
    pub events: Arc<EventBus>,
}

/// Summary of a successful dry run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DryRunReport {
    pub plugins: Vec<String>,
    pub tables: usize,
}

pub enum Initialized {
    DryRun(DryRunReport),
    Ready(Dependencies),
}

/// Build the shared infrastructure for `mode`.
pub async fn initialize(
    mode: &RunMode,
    config: &AppConfig,
    mut registry: PluginRegistry,
) -> Result<Initialized, InitError> {
    let pool = Arc::new(ResourcePool::with_size(mode.pool_size()));
    tracing::info!(size = pool.size(), "Resource pool created");

    let store = Arc::new(ConfigStore::connect(&config.store).await?);
    let events = Arc::new(EventBus::new(config.events.channel_capacity));

    store.init_databases().await?;

    for plugin in registry.all() {
        let ctx = RegistrationContext::new(plugin.name(), &store, &events);
        plugin.register(&ctx).map_err(|source| {
            tracing::error!(plugin = plugin.name(), error = %source, "Plugin registration failed");
            InitError::Plugin {
                plugin: plugin.name().to_string(),
                source,
            }
        })?;
        tracing::debug!(plugin = plugin.name(), "Plugin registered");
    }
    registry.freeze();
    tracing::info!(plugins = registry.len(), "Plugins initialized");

    if mode.dry_run() {
        return Ok(Initialized::DryRun(DryRunReport {
            plugins: registry.names().into_iter().map(String::from).collect(),
            tables: store.tables().len(),
        }));
    }

    let commands = Arc::new(CommandSet::compile(&registry)?);
    let mqueue = Arc::new(MessageQueue::init_stores(&store)?);

    Ok(Initialized::Ready(Dependencies {
        mode: mode.clone(),
        pool,
        store,
        registry: Arc::new(registry),
        commands,
        mqueue,
        events,
    }))
}
