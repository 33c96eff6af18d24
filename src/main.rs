//! YAGPDB runner
//!
//! ```text
//!   flags + config.toml
//!          │
//!          ▼
//!   ┌─────────────┐   ┌──────────────┐   ┌──────────────────────────┐
//!   │  run mode   │──▶│  initialize  │──▶│  launch                  │
//!   │  + pool sz  │   │  store,      │   │  bot │ web │ feeds │ bus │
//!   └─────────────┘   │  plugins,    │   └────────────┬─────────────┘
//!                     │  commands    │                │ SIGINT/SIGTERM
//!                     └──────────────┘                ▼
//!                                          ┌──────────────────────────┐
//!                                          │  shutdown coordinator    │
//!                                          │  stop → drain → grace    │
//!                                          └──────────────────────────┘
//! ```
//!
//! Exit codes: 0 after shutdown or a dry run, 1 on a fatal initialization
//! error, 2 on a configuration error. Metrics are only exported once the run
//! mode is valid.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use yagpdb_runner::cli::RunFlags;
use yagpdb_runner::config::load_or_default;
use yagpdb_runner::lifecycle::signals::{spawn_repeat_listener, TerminationSignals};
use yagpdb_runner::lifecycle::{
    initialize, launch, Initialized, RunMode, ShutdownCoordinator, ShutdownSession,
};
use yagpdb_runner::observability::logging::{init_logging, LoggingOptions};
use yagpdb_runner::observability::metrics;
use yagpdb_runner::plugins::builtin::plugins_for;
use yagpdb_runner::plugins::PluginRegistry;
use yagpdb_runner::subsystems::ServiceProvider;

#[tokio::main]
async fn main() -> ExitCode {
    let flags = RunFlags::from_env();

    let config = match load_or_default(flags.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed loading config: {e}");
            return ExitCode::from(2);
        }
    };

    init_logging(&LoggingOptions {
        level: config.observability.log_level.clone(),
        timestamps: flags.ts || config.testing,
        syslog: flags.syslog,
        sentry_dsn: LoggingOptions::sentry_dsn_from_env(),
    });

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "YAGPDB starting");

    let mode = match RunMode::resolve(&flags, &config.pool, &config.feeds) {
        Ok(mode) => mode,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::from(2);
        }
    };
    tracing::info!(
        bot = mode.run_bot(),
        web = mode.run_web(),
        feeds = ?mode.feed_names(),
        dry = mode.dry_run(),
        pool_size = mode.pool_size(),
        "Run mode resolved"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let registry = match PluginRegistry::from_plugins(plugins_for(&mode)) {
        Ok(registry) => registry,
        Err(e) => {
            tracing::error!(error = %e, "Failed building plugin registry");
            return ExitCode::FAILURE;
        }
    };

    let deps = match initialize(&mode, &config, registry).await {
        Ok(Initialized::Ready(deps)) => Arc::new(deps),
        Ok(Initialized::DryRun(report)) => {
            tracing::info!(
                plugins = report.plugins.len(),
                tables = report.tables,
                "Dry run completed, all plugins initialized"
            );
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed initializing");
            return ExitCode::FAILURE;
        }
    };

    let mut signals = match TerminationSignals::register() {
        Ok(signals) => signals,
        Err(e) => {
            tracing::error!(error = %e, "Failed registering signal handlers");
            return ExitCode::FAILURE;
        }
    };

    let config = Arc::new(config);
    let provider = ServiceProvider::new(deps.clone(), config.clone());
    let launched = launch(&mode, &provider, &deps.events);

    let coordinator = Arc::new(ShutdownCoordinator::new(&config.shutdown, config.testing));
    let signal = signals.recv().await;
    coordinator.signal(signal);
    spawn_repeat_listener(signals, coordinator.clone());

    let report = coordinator
        .shutdown(
            ShutdownSession::new(launched, Some(deps.store.clone()))
                .with_mqueue(deps.mqueue.clone()),
        )
        .await;
    if !report.failures.is_empty() {
        tracing::warn!(failures = ?report.failures, "Some subsystems failed to stop cleanly");
    }

    tracing::info!("Exiting");
    // Leave without dropping the runtime, which would wait on blocking tasks.
    std::process::exit(0)
}
