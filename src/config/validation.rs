//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (pool sizes, poll intervals)
//! - Check that addresses and URLs parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before any resource is created

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::AppConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("pool.{0} must be greater than zero")]
    ZeroPoolSize(&'static str),

    #[error("web.bind_address {0:?} is not a socket address")]
    BindAddress(String),

    #[error("bot.gateway_url {0:?} is not a valid URL")]
    GatewayUrl(String),

    #[error("feeds.{0}.url is not a valid URL")]
    FeedUrl(String),

    #[error("feeds.{0}.interval_secs must be greater than zero")]
    FeedInterval(String),

    #[error("events.channel_capacity must be greater than zero")]
    EventCapacity,
}

/// Check the configuration, collecting every problem found.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let pool = &config.pool;
    for (name, size) in [
        ("web_size", pool.web_size),
        ("bot_size", pool.bot_size),
        ("default_size", pool.default_size),
    ] {
        if size == 0 {
            errors.push(ValidationError::ZeroPoolSize(name));
        }
    }

    if config.web.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.web.bind_address.clone()));
    }

    if Url::parse(&config.bot.gateway_url).is_err() {
        errors.push(ValidationError::GatewayUrl(config.bot.gateway_url.clone()));
    }

    for (name, feed) in &config.feeds {
        if Url::parse(&feed.url).is_err() {
            errors.push(ValidationError::FeedUrl(name.clone()));
        }
        if feed.interval_secs == 0 {
            errors.push(ValidationError::FeedInterval(name.clone()));
        }
    }

    if config.events.channel_capacity == 0 {
        errors.push(ValidationError::EventCapacity);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::FeedConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&AppConfig::default()), Ok(()));
    }

    #[test]
    fn test_bad_feed_reported_by_name() {
        let mut config = AppConfig::default();
        config.feeds.insert(
            "broken".into(),
            FeedConfig {
                url: "not a url".into(),
                interval_secs: 0,
                channel_id: None,
            },
        );

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::FeedUrl("broken".into())));
        assert!(errors.contains(&ValidationError::FeedInterval("broken".into())));
    }

    #[test]
    fn test_bad_bind_address() {
        let mut config = AppConfig::default();
        config.web.bind_address = "localhost".into();
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::BindAddress("localhost".into())])
        );
    }
}
