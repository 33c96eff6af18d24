//! Metrics collection and exposition.
//!
//! # Metrics
//! - `yagpdb_subsystem_starts_total` (counter): subsystems launched, by kind
//! - `yagpdb_subsystem_start_failures_total` (counter): subsystems that failed to build or run
//! - `yagpdb_subsystem_stops_total` (counter): stop outcomes, by kind and result
//! - `yagpdb_subsystem_stop_duration_seconds` (histogram): stop + drain latency
//! - `yagpdb_commands_dispatched_total` (counter): bot commands run, by command
//! - `yagpdb_feed_polls_total` (counter): feed polls, by feed and result
//! - `yagpdb_events_dispatched_total` (counter): event bus dispatches, by event
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until an
//!   exporter is installed
//! - The Prometheus endpoint is opt-in (`observability.metrics_enabled`)

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_subsystem_started(kind: &'static str) {
    counter!("yagpdb_subsystem_starts_total", "kind" => kind).increment(1);
}

pub fn record_subsystem_failed(kind: &'static str) {
    counter!("yagpdb_subsystem_start_failures_total", "kind" => kind).increment(1);
}

pub fn record_subsystem_stopped(kind: &'static str, ok: bool, started: Instant) {
    let result = if ok { "ok" } else { "error" };
    counter!("yagpdb_subsystem_stops_total", "kind" => kind, "result" => result).increment(1);
    histogram!("yagpdb_subsystem_stop_duration_seconds", "kind" => kind)
        .record(started.elapsed().as_secs_f64());
}

pub fn record_command_dispatched(command: &str) {
    counter!("yagpdb_commands_dispatched_total", "command" => command.to_string()).increment(1);
}

pub fn record_feed_poll(feed: &str, ok: bool) {
    let result = if ok { "ok" } else { "error" };
    counter!("yagpdb_feed_polls_total", "feed" => feed.to_string(), "result" => result)
        .increment(1);
}

pub fn record_event_dispatched(event: &str, handlers: usize) {
    counter!("yagpdb_events_dispatched_total", "event" => event.to_string())
        .increment(handlers as u64);
}
