//! Feed pollers.
//!
//! One poller per requested feed, each on its own interval. A poll fetches
//! the feed URL while holding a pool slot; when the body changes the feed's
//! channel gets a notification through the message queue.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use url::Url;

use crate::common::{OutboundMessage, PoolError, StopSignal};
use crate::config::schema::FeedsConfig;
use crate::lifecycle::startup::Dependencies;
use crate::observability::metrics;
use crate::subsystems::{Subsystem, SubsystemError, SubsystemKind};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// A feed resolved from config.
#[derive(Debug, Clone)]
pub struct Feed {
    pub name: String,
    pub url: Url,
    pub interval: Duration,
    pub channel_id: Option<u64>,
}

/// Resolve `names` against the configured feeds. Unknown names are logged
/// and skipped.
pub fn resolve_feeds(names: &BTreeSet<String>, configured: &FeedsConfig) -> Vec<Feed> {
    let mut feeds = Vec::new();
    for name in names {
        let Some(config) = configured.get(name) else {
            tracing::warn!(feed = %name, "Unknown feed, skipping");
            continue;
        };
        match Url::parse(&config.url) {
            Ok(url) => feeds.push(Feed {
                name: name.clone(),
                url,
                interval: Duration::from_secs(config.interval_secs.max(1)),
                channel_id: config.channel_id,
            }),
            Err(e) => tracing::warn!(feed = %name, error = %e, "Invalid feed url, skipping"),
        }
    }
    feeds
}

pub struct FeedPool {
    feeds: Vec<Feed>,
    client: reqwest::Client,
    deps: Arc<Dependencies>,
    stop: StopSignal,
}

impl FeedPool {
    pub fn new(
        names: &BTreeSet<String>,
        configured: &FeedsConfig,
        deps: Arc<Dependencies>,
    ) -> Result<Self, SubsystemError> {
        let feeds = resolve_feeds(names, configured);
        if feeds.is_empty() {
            return Err(SubsystemError::NoFeeds(names.iter().cloned().collect()));
        }

        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!("yagpdb-feeds/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SubsystemError::Other(e.to_string()))?;

        Ok(Self {
            feeds,
            client,
            deps,
            stop: StopSignal::new(),
        })
    }

    pub fn feeds(&self) -> &[Feed] {
        &self.feeds
    }
}

#[async_trait]
impl Subsystem for FeedPool {
    fn kind(&self) -> SubsystemKind {
        SubsystemKind::FeedPool
    }

    async fn run(self: Arc<Self>) -> Result<(), SubsystemError> {
        let mut pollers = JoinSet::new();
        for feed in &self.feeds {
            let poller = Poller {
                feed: feed.clone(),
                client: self.client.clone(),
                deps: self.deps.clone(),
                last_digest: None,
            };
            pollers.spawn(poller.run(self.stop.clone()));
        }
        tracing::info!(feeds = self.feeds.len(), "Feed pollers started");

        while let Some(joined) = pollers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Feed poller panicked");
            }
        }

        tracing::info!("Feed pollers stopped");
        Ok(())
    }

    async fn stop(&self) -> Result<(), SubsystemError> {
        self.stop.trigger();
        Ok(())
    }
}

#[derive(Debug, Error)]
enum PollError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

struct Poller {
    feed: Feed,
    client: reqwest::Client,
    deps: Arc<Dependencies>,
    last_digest: Option<u64>,
}

impl Poller {
    async fn run(mut self, stop: StopSignal) {
        let mut ticker = tokio::time::interval(self.feed.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(feed = %self.feed.name, interval = ?self.feed.interval, "Feed poller starting");
        loop {
            tokio::select! {
                _ = stop.wait() => break,
                _ = ticker.tick() => {
                    let ok = match self.poll().await {
                        Ok(()) => true,
                        Err(e) => {
                            tracing::warn!(feed = %self.feed.name, error = %e, "Feed poll failed");
                            false
                        }
                    };
                    metrics::record_feed_poll(&self.feed.name, ok);
                }
            }
        }
    }

    async fn poll(&mut self) -> Result<(), PollError> {
        let body = {
            let _slot = self.deps.pool.acquire().await?;
            self.client
                .get(self.feed.url.clone())
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?
        };

        let digest = digest(&body);
        let changed = self.last_digest.is_some_and(|last| last != digest);
        self.last_digest = Some(digest);

        if changed {
            tracing::info!(feed = %self.feed.name, "Feed changed");
            if let Some(channel_id) = self.feed.channel_id {
                self.deps.mqueue.push(OutboundMessage {
                    channel_id,
                    content: format!("New posts in {}: {}", self.feed.name, self.feed.url),
                    source: format!("feeds/{}", self.feed.name),
                });
            }
        }
        Ok(())
    }
}

fn digest(body: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{default_feeds, FeedConfig};

    #[test]
    fn test_unknown_feeds_are_skipped() {
        let names: BTreeSet<String> = ["reddit", "twitter"].iter().map(|s| s.to_string()).collect();
        let feeds = resolve_feeds(&names, &default_feeds());
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].name, "reddit");
    }

    #[test]
    fn test_invalid_url_is_skipped() {
        let mut configured = FeedsConfig::new();
        configured.insert(
            "broken".into(),
            FeedConfig {
                url: "not a url".into(),
                interval_secs: 10,
                channel_id: None,
            },
        );
        let names: BTreeSet<String> = ["broken".to_string()].into_iter().collect();
        assert!(resolve_feeds(&names, &configured).is_empty());
    }

    #[test]
    fn test_digest_tracks_content() {
        assert_eq!(digest("a"), digest("a"));
        assert_ne!(digest("a"), digest("b"));
    }
}
