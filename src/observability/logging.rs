//! Structured logging setup.
//!
//! # Responsibilities
//! - Build the tracing subscriber from CLI switches and config
//! - Attach syslog and error-forwarding layers when requested
//! - Route panics through the log so they are forwarded too

use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::observability::sentry::{SentryDsn, SentryLayer, SENTRY_DSN_ENV};

/// Everything logging setup needs to know.
#[derive(Debug, Clone, Default)]
pub struct LoggingOptions {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Include timestamps in stdout output.
    pub timestamps: bool,
    /// Mirror output to syslog.
    pub syslog: bool,
    /// Error-forwarding DSN, usually from the environment.
    pub sentry_dsn: Option<String>,
}

impl LoggingOptions {
    /// Read the DSN from the environment; empty counts as unset.
    pub fn sentry_dsn_from_env() -> Option<String> {
        std::env::var(SENTRY_DSN_ENV).ok().filter(|dsn| !dsn.is_empty())
    }
}

/// Initialize the global subscriber. Must be called from within the runtime
/// when a DSN is configured, since the forwarder is spawned on it.
pub fn init_logging(options: &LoggingOptions) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{},tower_http=info", options.level).into());

    let sentry = options.sentry_dsn.as_deref().map(SentryDsn::parse);
    let sentry_layer = match sentry {
        Some(Ok(ref dsn)) => {
            let (layer, forwarder) = SentryLayer::new(dsn.clone());
            tokio::spawn(forwarder.run());
            Some(layer)
        }
        _ => None,
    };

    #[cfg(unix)]
    let (syslog_layer, syslog_error) = if options.syslog {
        match crate::observability::syslog::SyslogWriter::connect("yagpdb") {
            Ok(writer) => (
                Some(fmt::layer().with_writer(writer).with_ansi(false).without_time()),
                None,
            ),
            Err(e) => (None, Some(e.to_string())),
        }
    } else {
        (None, None)
    };
    #[cfg(not(unix))]
    let (syslog_layer, syslog_error) = (
        None::<tracing_subscriber::layer::Identity>,
        options
            .syslog
            .then(|| "syslog is only supported on unix".to_string()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer(options.timestamps, std::io::stdout))
        .with(syslog_layer)
        .with(sentry_layer)
        .init();

    match sentry {
        Some(Ok(dsn)) => tracing::info!(endpoint = %dsn.store_url(), "Added error reporting hook"),
        Some(Err(e)) => tracing::error!(error = %e, "Failed adding error reporting hook"),
        None => {}
    }
    if let Some(e) = syslog_error {
        tracing::warn!(error = %e, "Syslog output unavailable");
    }

    install_panic_hook();
}

/// Console output; every line carries its source file and line.
fn console_layer<S, W>(timestamps: bool, writer: W) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_file(true)
        .with_line_number(true);
    if timestamps {
        layer.boxed()
    } else {
        layer.without_time().boxed()
    }
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!(panic = %info, "Panic");
        default_hook(info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_console_lines_carry_source_location() {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = buf.clone();
        let subscriber = tracing_subscriber::registry()
            .with(console_layer(false, move || Capture(sink.clone())));

        tracing::subscriber::with_default(subscriber, || tracing::info!("located"));

        let out = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        assert!(out.contains("located"));
        assert!(out.contains("src/observability/logging.rs"));
    }
}
