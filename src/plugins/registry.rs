//! Ordered plugin registry.

use thiserror::Error;

use crate::plugins::{Capability, PluginHandle};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("plugin {0:?} registered after the registry was frozen")]
    Frozen(String),

    #[error("plugin {0:?} is already registered")]
    Duplicate(String),
}

/// Append-only collection of plugins, frozen before commands are compiled.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<PluginHandle>,
    frozen: bool,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from an ordered list of plugins.
    pub fn from_plugins<I>(plugins: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = PluginHandle>,
    {
        let mut registry = Self::new();
        for plugin in plugins {
            registry.register(plugin)?;
        }
        Ok(registry)
    }

    /// Append a plugin. Rejected once frozen or if the name is taken.
    pub fn register(&mut self, plugin: PluginHandle) -> Result<(), RegistryError> {
        if self.frozen {
            tracing::error!(plugin = plugin.name(), "Late plugin registration rejected");
            return Err(RegistryError::Frozen(plugin.name().to_string()));
        }
        if self.plugins.iter().any(|p| p.name() == plugin.name()) {
            return Err(RegistryError::Duplicate(plugin.name().to_string()));
        }
        self.plugins.push(plugin);
        Ok(())
    }

    /// Close the registry to further registration.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// All plugins in registration order.
    pub fn all(&self) -> &[PluginHandle] {
        &self.plugins
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Plugins tagged with `capability`, in registration order.
    pub fn with_capability(&self, capability: Capability) -> impl Iterator<Item = &PluginHandle> {
        self.plugins
            .iter()
            .filter(move |p| p.capabilities().contains(&capability))
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
