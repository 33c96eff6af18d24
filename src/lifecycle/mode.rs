//! Run mode resolution.
//!
//! Turns the raw run selectors into an immutable [`RunMode`], including the
//! shared pool size the selected subsystems need.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::cli::RunFlags;
use crate::config::{FeedConfig, PoolConfig};

/// No run selector was given.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Didn't specify what to run, see -h for more info")]
pub struct ConfigurationError;

/// Which subsystems to start, computed once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunMode {
    run_bot: bool,
    run_web: bool,
    feed_names: BTreeSet<String>,
    dry_run: bool,
    pool_size: usize,
}

impl RunMode {
    /// Resolve the run mode from flags.
    ///
    /// `-all` without an explicit `-feeds` list runs every configured feed.
    pub fn resolve<'a, I>(
        flags: &RunFlags,
        pool: &PoolConfig,
        configured_feeds: I,
    ) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = (&'a String, &'a FeedConfig)>,
    {
        let requested_feeds = flags.feed_names();
        if !flags.bot && !flags.web && requested_feeds.is_empty() && !flags.all && !flags.dry {
            return Err(ConfigurationError);
        }

        let run_bot = flags.bot || flags.all;
        let run_web = flags.web || flags.all;

        let feed_names: BTreeSet<String> = if requested_feeds.is_empty() && flags.all {
            configured_feeds.into_iter().map(|(name, _)| name.clone()).collect()
        } else {
            requested_feeds.into_iter().collect()
        };

        Ok(Self {
            run_bot,
            run_web,
            feed_names,
            dry_run: flags.dry,
            pool_size: pool_size(pool, run_bot, run_web),
        })
    }

    pub fn run_bot(&self) -> bool {
        self.run_bot
    }

    pub fn run_web(&self) -> bool {
        self.run_web
    }

    pub fn run_feeds(&self) -> bool {
        !self.feed_names.is_empty()
    }

    pub fn feed_names(&self) -> &BTreeSet<String> {
        &self.feed_names
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Shared pool size for this mode.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Whether any subsystem would be launched. Always false for a dry run.
    pub fn launches_anything(&self) -> bool {
        !self.dry_run && (self.run_bot || self.run_web || self.run_feeds())
    }
}

/// The bot's concurrency needs dominate when it runs.
fn pool_size(pool: &PoolConfig, run_bot: bool, run_web: bool) -> usize {
    if run_bot {
        pool.bot_size
    } else if run_web {
        pool.web_size
    } else {
        pool.default_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::default_feeds;

    fn resolve(flags: RunFlags) -> Result<RunMode, ConfigurationError> {
        RunMode::resolve(&flags, &PoolConfig::default(), &default_feeds())
    }

    #[test]
    fn test_no_selector_is_configuration_error() {
        for syslog in [false, true] {
            for ts in [false, true] {
                let flags = RunFlags {
                    syslog,
                    ts,
                    feeds: Some(",".into()),
                    ..Default::default()
                };
                assert_eq!(resolve(flags), Err(ConfigurationError));
            }
        }
    }

    #[test]
    fn test_combined_uses_bot_pool_size() {
        let mode = resolve(RunFlags { bot: true, web: true, ..Default::default() }).unwrap();
        assert_eq!(mode.pool_size(), 100);

        let web_only = resolve(RunFlags { web: true, ..Default::default() }).unwrap();
        assert_eq!(web_only.pool_size(), 25);

        let bot_only = resolve(RunFlags { bot: true, ..Default::default() }).unwrap();
        assert_eq!(bot_only.pool_size(), 100);
    }

    #[test]
    fn test_all_runs_every_configured_feed() {
        let mode = resolve(RunFlags { all: true, ..Default::default() }).unwrap();
        assert!(mode.run_bot() && mode.run_web());
        assert_eq!(
            mode.feed_names().iter().collect::<Vec<_>>(),
            vec!["reddit", "youtube"]
        );
        assert_eq!(mode.pool_size(), 100);
    }

    #[test]
    fn test_all_with_explicit_feeds() {
        let flags = RunFlags {
            all: true,
            feeds: Some("youtube".into()),
            ..Default::default()
        };
        let mode = resolve(flags).unwrap();
        assert_eq!(mode.feed_names().len(), 1);
        assert!(mode.feed_names().contains("youtube"));
    }

    #[test]
    fn test_dry_run_launches_nothing() {
        let flags = RunFlags { dry: true, all: true, ..Default::default() };
        let mode = resolve(flags).unwrap();
        assert!(mode.dry_run());
        assert!(!mode.launches_anything());

        let dry_only = resolve(RunFlags { dry: true, ..Default::default() }).unwrap();
        assert!(!dry_only.launches_anything());
        assert_eq!(dry_only.pool_size(), 10);
    }

    #[test]
    fn test_feeds_only() {
        let flags = RunFlags { feeds: Some("reddit".into()), ..Default::default() };
        let mode = resolve(flags).unwrap();
        assert!(mode.run_feeds());
        assert!(!mode.run_bot() && !mode.run_web());
        assert!(mode.launches_anything());
    }
}
