//! Built-in feature plugins.
//!
//! The list below is the whole plugin set, in registration order. Adding a
//! plugin means adding it here; nothing registers itself.

use std::sync::Arc;

use crate::lifecycle::mode::RunMode;
use crate::plugins::{
    Capability, CommandDef, Plugin, PluginError, PluginHandle, RegistrationContext,
};

use Capability::{BackgroundWorker, Commands, EventHandler, StorageMigration};

/// A plugin described entirely by static data.
#[derive(Debug, Clone)]
pub struct FeaturePlugin {
    name: &'static str,
    capabilities: &'static [Capability],
    tables: &'static [&'static str],
    events: &'static [&'static str],
    commands: &'static [(&'static str, &'static str)],
}

impl Plugin for FeaturePlugin {
    fn name(&self) -> &str {
        self.name
    }

    fn capabilities(&self) -> &[Capability] {
        self.capabilities
    }

    fn register(&self, ctx: &RegistrationContext<'_>) -> Result<(), PluginError> {
        for table in self.tables {
            ctx.table(table)?;
        }

        let plugin = self.name;
        for event in self.events {
            ctx.on_event(event, move |event| {
                tracing::debug!(plugin, event = %event.name, target = ?event.target, "Handling event");
            });
        }
        Ok(())
    }

    fn commands(&self) -> Vec<CommandDef> {
        self.commands
            .iter()
            .map(|(name, description)| CommandDef::new(*name, *description))
            .collect()
    }
}

static BUILTIN: &[FeaturePlugin] = &[
    FeaturePlugin {
        name: "discordlogger",
        capabilities: &[EventHandler],
        tables: &[],
        events: &["guild_create", "guild_delete"],
        commands: &[],
    },
    FeaturePlugin {
        name: "commands",
        capabilities: &[Commands],
        tables: &["commands_settings"],
        events: &[],
        commands: &[
            ("help", "Shows help about all or one specific command"),
            ("prefix", "Shows the command prefix of the current server"),
        ],
    },
    FeaturePlugin {
        name: "stdcommands",
        capabilities: &[Commands],
        tables: &[],
        events: &[],
        commands: &[
            ("ping", "Shows the gateway latency"),
            ("info", "Responds with bot information"),
            ("invite", "Responds with the bot invite link"),
            ("roll", "Rolls a dice"),
            ("weather", "Shows the weather somewhere"),
        ],
    },
    FeaturePlugin {
        name: "serverstats",
        capabilities: &[Commands, StorageMigration, BackgroundWorker],
        tables: &["serverstats_config", "serverstats_periods"],
        events: &["member_join", "member_leave"],
        commands: &[("stats", "Shows server stats")],
    },
    FeaturePlugin {
        name: "notifications",
        capabilities: &[StorageMigration, EventHandler],
        tables: &["notifications_config"],
        events: &["member_join", "member_leave", "channel_topic_change"],
        commands: &[],
    },
    FeaturePlugin {
        name: "customcommands",
        capabilities: &[Commands, StorageMigration],
        tables: &["custom_commands"],
        events: &[],
        commands: &[("customcommands", "Shows a custom command by id or lists them")],
    },
    FeaturePlugin {
        name: "reddit",
        capabilities: &[StorageMigration],
        tables: &["reddit_feeds"],
        events: &[],
        commands: &[],
    },
    FeaturePlugin {
        name: "moderation",
        capabilities: &[Commands, StorageMigration],
        tables: &["moderation_config", "moderation_warnings"],
        events: &[],
        commands: &[
            ("ban", "Bans a member"),
            ("kick", "Kicks a member"),
            ("mute", "Mutes a member"),
            ("unmute", "Unmutes a member"),
            ("warn", "Warns a member"),
            ("clean", "Deletes recent messages"),
        ],
    },
    FeaturePlugin {
        name: "reputation",
        capabilities: &[Commands, StorageMigration],
        tables: &["reputation_config", "reputation_users"],
        events: &[],
        commands: &[
            ("giverep", "Gives reputation to a member"),
            ("toprep", "Shows the reputation leaderboard"),
        ],
    },
    FeaturePlugin {
        name: "aylien",
        capabilities: &[Commands],
        tables: &[],
        events: &[],
        commands: &[("sentiment", "Does sentiment analysis on a message")],
    },
    FeaturePlugin {
        name: "streaming",
        capabilities: &[StorageMigration, EventHandler],
        tables: &["streaming_config"],
        events: &["presence_update", "update_streaming"],
        commands: &[],
    },
    FeaturePlugin {
        name: "automod",
        capabilities: &[StorageMigration, EventHandler],
        tables: &["automod_rules"],
        events: &["message_create"],
        commands: &[],
    },
    FeaturePlugin {
        name: "logs",
        capabilities: &[Commands, EventHandler],
        tables: &["message_logs", "username_history"],
        events: &["message_create"],
        commands: &[
            ("logs", "Creates a log of the last messages in the channel"),
            ("whois", "Shows information about a member"),
            ("usernames", "Shows past usernames of a member"),
        ],
    },
    FeaturePlugin {
        name: "autorole",
        capabilities: &[Commands, StorageMigration, BackgroundWorker],
        tables: &["autorole_config"],
        events: &["member_join"],
        commands: &[("role", "Gives yourself a role or lists available roles")],
    },
    FeaturePlugin {
        name: "reminders",
        capabilities: &[Commands, BackgroundWorker],
        tables: &["reminders"],
        events: &[],
        commands: &[
            ("remindme", "Schedules a reminder"),
            ("reminders", "Lists your active reminders"),
            ("delreminder", "Deletes a reminder"),
        ],
    },
    FeaturePlugin {
        name: "soundboard",
        capabilities: &[Commands],
        tables: &["soundboard_sounds"],
        events: &[],
        commands: &[("playsound", "Plays a sound from the soundboard")],
    },
    FeaturePlugin {
        name: "youtube",
        capabilities: &[StorageMigration],
        tables: &["youtube_feeds"],
        events: &[],
        commands: &[],
    },
    FeaturePlugin {
        name: "rolecommands",
        capabilities: &[Commands, StorageMigration],
        tables: &["role_commands", "role_menus"],
        events: &[],
        commands: &[
            ("role", "Toggles a self-assignable role"),
            ("rolemenu", "Sets up a role menu"),
        ],
    },
];

/// Plugins that only make sense while the bot runs.
static BOT_ONLY: &[FeaturePlugin] = &[
    FeaturePlugin {
        name: "mqueue",
        capabilities: &[BackgroundWorker],
        tables: &[],
        events: &[],
        commands: &[],
    },
    FeaturePlugin {
        name: "botrest",
        capabilities: &[BackgroundWorker, EventHandler],
        tables: &[],
        events: &["botrest_ping"],
        commands: &[],
    },
];

fn handles(plugins: &'static [FeaturePlugin]) -> impl Iterator<Item = PluginHandle> {
    plugins.iter().map(|p| Arc::new(p.clone()) as PluginHandle)
}

/// The plugin set for `mode`, in registration order.
pub fn plugins_for(mode: &RunMode) -> Vec<PluginHandle> {
    let mut plugins: Vec<PluginHandle> = handles(BUILTIN).collect();
    if mode.run_bot() {
        plugins.extend(handles(BOT_ONLY));
    }
    plugins
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::RunFlags;
    use crate::config::schema::{default_feeds, PoolConfig};
    use crate::plugins::PluginRegistry;

    fn mode(flags: RunFlags) -> RunMode {
        RunMode::resolve(&flags, &PoolConfig::default(), &default_feeds()).unwrap()
    }

    #[test]
    fn test_builtin_order_and_bot_plugins() {
        let web = plugins_for(&mode(RunFlags { web: true, ..Default::default() }));
        assert_eq!(web.len(), 18);
        assert_eq!(web[0].name(), "discordlogger");
        assert_eq!(web[17].name(), "rolecommands");

        let bot = plugins_for(&mode(RunFlags { bot: true, ..Default::default() }));
        let names: Vec<&str> = bot.iter().map(|p| p.name()).collect();
        assert_eq!(&names[18..], &["mqueue", "botrest"]);
    }

    #[test]
    fn test_builtin_names_are_unique() {
        let all = plugins_for(&mode(RunFlags { all: true, ..Default::default() }));
        assert!(PluginRegistry::from_plugins(all).is_ok());
    }
}
