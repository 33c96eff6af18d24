//! Command line flags.
//!
//! Flags are accepted both in single-dash long form (`-bot`, `-feeds reddit`)
//! and in the usual `--bot` form.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;

/// Long flags that may be written with a single dash.
const LONG_FLAGS: &[&str] = &["bot", "web", "feeds", "all", "dry", "syslog", "ts", "config"];

/// Raw run selectors and logging switches, before mode resolution.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "yagpdb")]
#[command(about = "Runs the bot, web server and feed pollers", long_about = None)]
pub struct RunFlags {
    /// Run the bot and bot related services
    #[arg(long)]
    pub bot: bool,

    /// Run the web server
    #[arg(long)]
    pub web: bool,

    /// Which feeds to run, comma separated list (e.g. reddit,youtube)
    #[arg(long, value_name = "NAMES")]
    pub feeds: Option<String>,

    /// Run everything (bot, web server and feeds)
    #[arg(long)]
    pub all: bool,

    /// Initialize all plugins but don't start anything
    #[arg(long)]
    pub dry: bool,

    /// Also log to syslog (unix only)
    #[arg(long)]
    pub syslog: bool,

    /// Include timestamps in log output
    #[arg(long)]
    pub ts: bool,

    /// Path to a TOML configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl RunFlags {
    /// Parse flags from the process arguments.
    pub fn from_env() -> Self {
        Self::parse_from(normalize_args(std::env::args_os()))
    }

    /// Feed names from `-feeds`, trimmed, empties dropped.
    pub fn feed_names(&self) -> Vec<String> {
        self.feeds
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Rewrite `-name` / `-name=value` into `--name` / `--name=value` for the
/// known long flags. Everything else passes through untouched.
pub fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator,
    I::Item: Into<OsString>,
{
    args.into_iter()
        .map(Into::into)
        .map(|arg| {
            let Some(text) = arg.to_str() else {
                return arg;
            };
            if text.starts_with("--") || !text.starts_with('-') {
                return arg;
            }
            let name = text[1..].split('=').next().unwrap_or_default();
            if LONG_FLAGS.contains(&name) {
                OsString::from(format!("-{text}"))
            } else {
                arg
            }
        })
        .collect()
}
