//! Aggregate command set compiled from the plugin registry.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::plugins::PluginRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("command set compiled before the plugin registry was frozen")]
    RegistryNotFrozen,

    #[error("plugin {plugin:?} defines an invalid command name {name:?}")]
    InvalidName { plugin: String, name: String },
}

/// A compiled command and the plugin that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub description: String,
    pub plugin: String,
}

/// Read-only command table, keyed by lowercase name.
#[derive(Debug, Default)]
pub struct CommandSet {
    commands: BTreeMap<String, Command>,
}

impl CommandSet {
    /// Fold every plugin's commands in registration order. A later plugin's
    /// command replaces an earlier one with the same name.
    pub fn compile(registry: &PluginRegistry) -> Result<Self, CompileError> {
        if !registry.is_frozen() {
            return Err(CompileError::RegistryNotFrozen);
        }

        let mut commands = BTreeMap::new();
        for plugin in registry.all() {
            for def in plugin.commands() {
                if def.name.is_empty() || def.name.contains(char::is_whitespace) {
                    return Err(CompileError::InvalidName {
                        plugin: plugin.name().to_string(),
                        name: def.name,
                    });
                }

                let key = def.name.to_lowercase();
                let command = Command {
                    name: def.name,
                    description: def.description,
                    plugin: plugin.name().to_string(),
                };
                if let Some(shadowed) = commands.insert(key, command) {
                    tracing::debug!(
                        command = %shadowed.name,
                        shadowed = %shadowed.plugin,
                        by = plugin.name(),
                        "Command shadowed"
                    );
                }
            }
        }

        tracing::info!(commands = commands.len(), "Compiled command set");
        Ok(Self { commands })
    }

    pub fn lookup(&self, name: &str) -> Option<&Command> {
        self.commands.get(&name.to_lowercase())
    }

    /// Split `content` into a known command and its arguments, if it starts
    /// with `prefix`.
    pub fn parse_invocation<'a>(
        &self,
        prefix: &str,
        content: &'a str,
    ) -> Option<(&Command, &'a str)> {
        let rest = content.strip_prefix(prefix)?;
        let (name, args) = rest
            .split_once(char::is_whitespace)
            .unwrap_or((rest, ""));
        self.lookup(name).map(|command| (command, args.trim()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.values().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{CommandDef, Plugin, PluginError, PluginHandle, RegistrationContext};
    use std::sync::Arc;

    struct WithCommands(&'static str, Vec<(&'static str, &'static str)>);

    impl Plugin for WithCommands {
        fn name(&self) -> &str {
            self.0
        }

        fn register(&self, _ctx: &RegistrationContext<'_>) -> Result<(), PluginError> {
            Ok(())
        }

        fn commands(&self) -> Vec<CommandDef> {
            self.1.iter().map(|(n, d)| CommandDef::new(*n, *d)).collect()
        }
    }

    fn frozen(plugins: Vec<PluginHandle>) -> PluginRegistry {
        let mut registry = PluginRegistry::from_plugins(plugins).unwrap();
        registry.freeze();
        registry
    }

    #[test]
    fn test_requires_frozen_registry() {
        let registry = PluginRegistry::new();
        assert_eq!(
            CommandSet::compile(&registry).unwrap_err(),
            CompileError::RegistryNotFrozen
        );
    }

    #[test]
    fn test_later_plugin_shadows_earlier() {
        let registry = frozen(vec![
            Arc::new(WithCommands("autorole", vec![("role", "autorole's role")])),
            Arc::new(WithCommands("rolecommands", vec![("Role", "rolecommands' role")])),
        ]);

        let set = CommandSet::compile(&registry).unwrap();
        assert_eq!(set.len(), 1);
        let role = set.lookup("ROLE").unwrap();
        assert_eq!(role.plugin, "rolecommands");
        assert_eq!(role.name, "Role");
    }

    #[test]
    fn test_invalid_name() {
        let registry = frozen(vec![Arc::new(WithCommands("bad", vec![("two words", "")]))]);
        assert!(matches!(
            CommandSet::compile(&registry),
            Err(CompileError::InvalidName { .. })
        ));
    }

    #[test]
    fn test_parse_invocation() {
        let registry = frozen(vec![Arc::new(WithCommands(
            "reminders",
            vec![("remindme", "Schedules a reminder")],
        ))]);
        let set = CommandSet::compile(&registry).unwrap();

        let (command, args) = set.parse_invocation("-", "-remindme 1h  stretch").unwrap();
        assert_eq!(command.name, "remindme");
        assert_eq!(args, "1h  stretch");

        assert!(set.parse_invocation("-", "-unknown").is_none());
        assert!(set.parse_invocation("-", "remindme").is_none());
        assert_eq!(set.parse_invocation("-", "-remindme").unwrap().1, "");
    }
}
