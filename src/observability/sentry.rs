//! Error forwarding to a Sentry-compatible endpoint.
//!
//! ERROR-level tracing events are converted to store-API payloads and handed
//! to a background forwarder over a bounded channel. When the channel is full
//! events are dropped rather than blocking the logging call site.

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{layer::Context, registry::LookupSpan, Layer};
use url::Url;

/// Environment variable holding the DSN.
pub const SENTRY_DSN_ENV: &str = "YAGPDB_SENTRY_DSN";

const FORWARD_BUFFER: usize = 256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DsnError {
    #[error("invalid DSN URL: {0}")]
    Url(String),

    #[error("DSN has no public key")]
    MissingKey,

    #[error("DSN has no project id")]
    MissingProject,
}

/// A parsed DSN: where to post and how to authenticate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentryDsn {
    store_url: Url,
    public_key: String,
}

impl SentryDsn {
    /// Parse `scheme://key@host[:port]/[path/]project`.
    pub fn parse(dsn: &str) -> Result<Self, DsnError> {
        let url = Url::parse(dsn).map_err(|e| DsnError::Url(e.to_string()))?;

        let public_key = url.username().to_string();
        if public_key.is_empty() {
            return Err(DsnError::MissingKey);
        }

        let mut segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();
        let project = segments.pop().ok_or(DsnError::MissingProject)?;
        let prefix = segments.join("/");

        let host = url.host_str().ok_or_else(|| DsnError::Url("missing host".into()))?;
        let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();
        let path = if prefix.is_empty() {
            format!("/api/{project}/store/")
        } else {
            format!("/{prefix}/api/{project}/store/")
        };
        let store_url = Url::parse(&format!("{}://{host}{port}{path}", url.scheme()))
            .map_err(|e| DsnError::Url(e.to_string()))?;

        Ok(Self {
            store_url,
            public_key,
        })
    }

    pub fn store_url(&self) -> &Url {
        &self.store_url
    }

    fn auth_header(&self) -> String {
        format!(
            "Sentry sentry_version=7, sentry_key={}, sentry_client=yagpdb-runner/{}",
            self.public_key,
            env!("CARGO_PKG_VERSION")
        )
    }
}

/// Tracing layer capturing ERROR events for forwarding.
pub struct SentryLayer {
    tx: mpsc::Sender<Value>,
}

impl SentryLayer {
    /// Create the layer and the forwarder that drains it.
    pub fn new(dsn: SentryDsn) -> (Self, SentryForwarder) {
        let (tx, rx) = mpsc::channel(FORWARD_BUFFER);
        (
            Self { tx },
            SentryForwarder {
                dsn,
                rx,
                client: reqwest::Client::new(),
            },
        )
    }
}

impl<S> Layer<S> for SentryLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != Level::ERROR {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();

        let payload = json!({
            "event_id": uuid::Uuid::new_v4().simple().to_string(),
            "timestamp": timestamp,
            "level": "error",
            "platform": "other",
            "logger": event.metadata().target(),
            "message": visitor.message.unwrap_or_default(),
            "extra": Value::Object(visitor.fields),
        });

        // Dropped when the forwarder is behind.
        let _ = self.tx.try_send(payload);
    }
}

#[derive(Default)]
struct FieldVisitor {
    fields: Map<String, Value>,
    message: Option<String>,
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        let value = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.insert(field.name().to_string(), Value::String(value));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields
                .insert(field.name().to_string(), Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.fields.insert(field.name().to_string(), value.into());
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.fields.insert(field.name().to_string(), value.into());
    }
}

/// Background task posting captured events.
pub struct SentryForwarder {
    dsn: SentryDsn,
    rx: mpsc::Receiver<Value>,
    client: reqwest::Client,
}

impl SentryForwarder {
    pub async fn run(mut self) {
        while let Some(payload) = self.rx.recv().await {
            let result = self
                .client
                .post(self.dsn.store_url.clone())
                .header("X-Sentry-Auth", self.dsn.auth_header())
                .json(&payload)
                .send()
                .await;

            // Never log at ERROR here, or the failure would be forwarded again.
            match result {
                Ok(res) if !res.status().is_success() => {
                    tracing::warn!(status = %res.status(), "Error report rejected");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Failed sending error report"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::prelude::*;

    #[test]
    fn test_parse_dsn() {
        let dsn = SentryDsn::parse("https://abc123@o1.ingest.example.com/42").unwrap();
        assert_eq!(
            dsn.store_url().as_str(),
            "https://o1.ingest.example.com/api/42/store/"
        );
        assert!(dsn.auth_header().contains("sentry_key=abc123"));
    }

    #[test]
    fn test_parse_dsn_with_port_and_prefix() {
        let dsn = SentryDsn::parse("http://key@localhost:9000/sentry/7").unwrap();
        assert_eq!(
            dsn.store_url().as_str(),
            "http://localhost:9000/sentry/api/7/store/"
        );
    }

    #[test]
    fn test_parse_dsn_errors() {
        assert_eq!(
            SentryDsn::parse("https://example.com/1"),
            Err(DsnError::MissingKey)
        );
        assert_eq!(
            SentryDsn::parse("https://key@example.com/"),
            Err(DsnError::MissingProject)
        );
        assert!(matches!(SentryDsn::parse("not a dsn"), Err(DsnError::Url(_))));
    }

    #[test]
    fn test_layer_captures_only_errors() {
        let dsn = SentryDsn::parse("https://key@example.com/1").unwrap();
        let (layer, mut forwarder) = SentryLayer::new(dsn);
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("not forwarded");
            tracing::warn!("not forwarded either");
            tracing::error!(plugin = "reminders", attempt = 3u64, "Failed initializing");
        });

        let payload = forwarder.rx.try_recv().expect("error event should be captured");
        assert_eq!(payload["message"], "Failed initializing");
        assert_eq!(payload["extra"]["plugin"], "reminders");
        assert_eq!(payload["extra"]["attempt"], 3);
        assert!(forwarder.rx.try_recv().is_err());
    }
}
