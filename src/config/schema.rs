//! Configuration schema definitions.
//!
//! This module defines the complete file configuration for the runner.
//! All types derive Serde traits for deserialization from TOML files, and
//! every section has defaults so an empty file (or no file) is valid.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the runner.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Persistent configuration store settings.
    pub store: StoreConfig,

    /// Shared resource pool sizing policy.
    pub pool: PoolConfig,

    /// Web server settings.
    pub web: WebConfig,

    /// Bot gateway connection settings.
    pub bot: BotConfig,

    /// Feed definitions keyed by feed name.
    pub feeds: FeedsConfig,

    /// Cross-process event bus settings.
    pub events: EventsConfig,

    /// Graceful shutdown schedule.
    pub shutdown: ShutdownConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Testing/verification mode (skips the long settle grace period).
    pub testing: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            pool: PoolConfig::default(),
            web: WebConfig::default(),
            bot: BotConfig::default(),
            feeds: default_feeds(),
            events: EventsConfig::default(),
            shutdown: ShutdownConfig::default(),
            observability: ObservabilityConfig::default(),
            testing: false,
        }
    }
}

/// Persistent store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the store snapshot.
    pub data_dir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
        }
    }
}

/// Resource pool sizes per run mode.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Pool size when only the web server runs.
    pub web_size: usize,

    /// Pool size whenever the bot runs (alone or combined).
    pub bot_size: usize,

    /// Pool size when neither bot nor web runs.
    pub default_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            web_size: 25,
            bot_size: 100,
            default_size: 10,
        }
    }
}

/// Web server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebConfig {
    /// Bind address (e.g., "0.0.0.0:5000").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Bot gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BotConfig {
    /// Gateway websocket URL.
    pub gateway_url: String,

    /// Prefix that marks a message as a command.
    pub command_prefix: String,

    /// Base delay for reconnect backoff in milliseconds.
    pub reconnect_base_ms: u64,

    /// Maximum delay for reconnect backoff in milliseconds.
    pub reconnect_max_ms: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            gateway_url: "ws://127.0.0.1:5100/gateway".to_string(),
            command_prefix: "-".to_string(),
            reconnect_base_ms: 500,
            reconnect_max_ms: 30_000,
        }
    }
}

/// Feed definitions keyed by name.
pub type FeedsConfig = BTreeMap<String, FeedConfig>;

/// A single polled feed.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
    /// URL fetched on every poll.
    pub url: String,

    /// Poll interval in seconds.
    #[serde(default = "default_feed_interval")]
    pub interval_secs: u64,

    /// Channel that receives change notifications.
    #[serde(default)]
    pub channel_id: Option<u64>,
}

fn default_feed_interval() -> u64 {
    60
}

/// Built-in feed definitions used when the file does not define any.
pub fn default_feeds() -> FeedsConfig {
    let mut feeds = BTreeMap::new();
    feeds.insert(
        "reddit".to_string(),
        FeedConfig {
            url: "https://www.reddit.com/r/all/new.json?limit=25".to_string(),
            interval_secs: default_feed_interval(),
            channel_id: None,
        },
    );
    feeds.insert(
        "youtube".to_string(),
        FeedConfig {
            url: "https://www.youtube.com/feeds/videos.xml?channel_id=UC_x5XG1OV2P6uZZ5FSM9Ttw"
                .to_string(),
            interval_secs: 300,
            channel_id: None,
        },
    );
    feeds
}

/// Event bus configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Capacity of the pending-event channel.
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

/// Graceful shutdown schedule.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Sleep after the synchronous web stop, in milliseconds.
    pub web_flush_ms: u64,

    /// Sleep after the drain join, in milliseconds.
    pub post_join_ms: u64,

    /// Extra settle sleep outside testing mode, in milliseconds.
    pub settle_ms: u64,

    /// Upper bound on the drain join in seconds. Zero waits forever.
    pub drain_timeout_secs: u64,

    /// Also stop and join the event poller during shutdown.
    pub join_event_poller: bool,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            web_flush_ms: 1_000,
            post_join_ms: 1_000,
            settle_ms: 4_000,
            drain_timeout_secs: 30,
            join_event_poller: false,
        }
    }
}

impl ShutdownConfig {
    pub fn drain_timeout(&self) -> Option<Duration> {
        (self.drain_timeout_secs > 0).then(|| Duration::from_secs(self.drain_timeout_secs))
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
