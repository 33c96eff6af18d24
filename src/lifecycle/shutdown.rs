//! Shutdown coordination.
//!
//! # State Machine
//! ```text
//! Running → Signaled → Stopping → Draining → Terminated
//! ```
//! - `Signaled` is entered exactly once; later signals are logged and ignored
//! - `Stopping`: bot and feed stops run as concurrent tasks, the web stop runs
//!   inline and is followed by a flush delay
//! - `Draining`: join the concurrent stops, bounded by the drain timeout
//! - `Terminated`: post-join grace, pending messages persisted and the store
//!   flushed, settle grace (skipped when testing)
//!
//! Stop failures are logged and reported, never propagated.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;

use crate::common::{ConfigStore, EventPollerHandle, MessageQueue};
use crate::config::ShutdownConfig;
use crate::lifecycle::launcher::{Launched, SubsystemHandle};
use crate::observability::metrics;
use crate::subsystems::{SubsystemError, SubsystemKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ShutdownState {
    Running = 0,
    Signaled = 1,
    Stopping = 2,
    Draining = 3,
    Terminated = 4,
}

impl ShutdownState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ShutdownState::Running,
            1 => ShutdownState::Signaled,
            2 => ShutdownState::Stopping,
            3 => ShutdownState::Draining,
            _ => ShutdownState::Terminated,
        }
    }
}

/// Fixed delays inserted during shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraceSchedule {
    pub web_flush: Duration,
    pub post_join: Duration,
    /// `None` in testing mode.
    pub settle: Option<Duration>,
}

impl GraceSchedule {
    pub fn from_config(config: &ShutdownConfig, testing: bool) -> Self {
        Self {
            web_flush: Duration::from_millis(config.web_flush_ms),
            post_join: Duration::from_millis(config.post_join_ms),
            settle: (!testing).then(|| Duration::from_millis(config.settle_ms)),
        }
    }
}

/// What the shutdown sequence operates on.
pub struct ShutdownSession {
    pub handles: Vec<SubsystemHandle>,
    pub event_poller: Option<EventPollerHandle>,
    pub store: Option<Arc<ConfigStore>>,
    /// Persisted into `store` before it is flushed.
    pub mqueue: Option<Arc<MessageQueue>>,
}

impl ShutdownSession {
    pub fn new(launched: Launched, store: Option<Arc<ConfigStore>>) -> Self {
        Self {
            handles: launched.handles,
            event_poller: Some(launched.event_poller),
            store,
            mqueue: None,
        }
    }

    pub fn with_mqueue(mut self, mqueue: Arc<MessageQueue>) -> Self {
        self.mqueue = Some(mqueue);
        self
    }
}

/// Outcome of a shutdown sequence.
#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    pub stops_invoked: Vec<SubsystemKind>,
    pub failures: Vec<(SubsystemKind, String)>,
    pub drain_timed_out: bool,
    pub event_poller_joined: bool,
    /// False when another sequence already ran.
    pub completed: bool,
}

pub struct ShutdownCoordinator {
    state: AtomicU8,
    schedule: GraceSchedule,
    drain_timeout: Option<Duration>,
    join_event_poller: bool,
}

impl ShutdownCoordinator {
    pub fn new(config: &ShutdownConfig, testing: bool) -> Self {
        Self {
            state: AtomicU8::new(ShutdownState::Running as u8),
            schedule: GraceSchedule::from_config(config, testing),
            drain_timeout: config.drain_timeout(),
            join_event_poller: config.join_event_poller,
        }
    }

    pub fn state(&self) -> ShutdownState {
        ShutdownState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Record a termination signal. Returns true only for the first one.
    pub fn signal(&self, name: &str) -> bool {
        if self.transition(ShutdownState::Running, ShutdownState::Signaled) {
            tracing::info!(signal = name, "Received termination signal, shutting down");
            true
        } else {
            tracing::warn!(signal = name, state = ?self.state(), "Already shutting down, ignoring signal");
            false
        }
    }

    fn transition(&self, from: ShutdownState, to: ShutdownState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn set(&self, state: ShutdownState) {
        tracing::debug!(?state, "Shutdown state");
        self.state.store(state as u8, Ordering::Release);
    }

    /// Run the stop sequence over `session`.
    ///
    /// Records an implicit signal if none arrived. If a sequence is already
    /// underway the session is left untouched and an incomplete report is
    /// returned.
    pub async fn shutdown(&self, session: ShutdownSession) -> ShutdownReport {
        let mut report = ShutdownReport::default();

        self.transition(ShutdownState::Running, ShutdownState::Signaled);
        if !self.transition(ShutdownState::Signaled, ShutdownState::Stopping) {
            tracing::warn!(state = ?self.state(), "Shutdown sequence already running");
            return report;
        }
        tracing::debug!(state = ?ShutdownState::Stopping, "Shutdown state");

        let mut joins = JoinSet::new();
        let mut inline = Vec::new();
        for handle in session.handles {
            match handle.kind() {
                SubsystemKind::WebServer => inline.push(handle),
                kind => {
                    report.stops_invoked.push(kind);
                    joins.spawn(stop_and_wait(handle));
                }
            }
        }

        for handle in inline {
            let kind = handle.kind();
            report.stops_invoked.push(kind);
            let started = Instant::now();
            let result = handle.stop().await;
            record_outcome(kind, result, started, &mut report);
            tokio::time::sleep(self.schedule.web_flush).await;
        }

        self.set(ShutdownState::Draining);
        if joins.is_empty() {
            tracing::debug!("No concurrent stops to drain");
        } else {
            let drain = async {
                while let Some(joined) = joins.join_next().await {
                    match joined {
                        Ok((kind, result, started)) => {
                            record_outcome(kind, result, started, &mut report)
                        }
                        Err(e) => tracing::error!(error = %e, "Stop task panicked"),
                    }
                }
            };

            match self.drain_timeout {
                Some(limit) => {
                    if tokio::time::timeout(limit, drain).await.is_err() {
                        report.drain_timed_out = true;
                        tracing::warn!(
                            timeout = ?limit,
                            pending = joins.len(),
                            "Timed out waiting for subsystems to stop, continuing shutdown"
                        );
                    }
                }
                None => drain.await,
            }
        }

        if let Some(poller) = session.event_poller {
            if self.join_event_poller {
                poller.join().await;
                report.event_poller_joined = true;
            } else {
                tracing::debug!("Leaving event poller to exit with the process");
            }
        }

        tokio::time::sleep(self.schedule.post_join).await;

        if let Some(store) = session.store {
            if let Some(mqueue) = &session.mqueue {
                match mqueue.persist(&store) {
                    Ok(0) => {}
                    Ok(pending) => tracing::info!(pending, "Persisted queued messages"),
                    Err(e) => tracing::error!(error = %e, "Failed persisting queued messages"),
                }
            }
            if let Err(e) = store.flush().await {
                tracing::error!(error = %e, "Failed flushing config store");
            }
        }
        if let Some(settle) = self.schedule.settle {
            tokio::time::sleep(settle).await;
        }

        self.set(ShutdownState::Terminated);
        report.completed = true;
        tracing::info!(
            stopped = report.stops_invoked.len(),
            failures = report.failures.len(),
            drain_timed_out = report.drain_timed_out,
            "Shutdown complete"
        );
        report
    }
}

async fn stop_and_wait(
    handle: SubsystemHandle,
) -> (SubsystemKind, Result<(), SubsystemError>, Instant) {
    let started = Instant::now();
    let result = handle.stop().await;
    let kind = handle.kind();
    handle.wait().await;
    (kind, result, started)
}

fn record_outcome(
    kind: SubsystemKind,
    result: Result<(), SubsystemError>,
    started: Instant,
    report: &mut ShutdownReport,
) {
    metrics::record_subsystem_stopped(kind.as_str(), result.is_ok(), started);
    match result {
        Ok(()) => tracing::info!(subsystem = %kind, "Subsystem stopped"),
        Err(e) => {
            tracing::error!(subsystem = %kind, error = %e, "Subsystem stop failed");
            report.failures.push((kind, e.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ShutdownConfig {
        ShutdownConfig::default()
    }

    #[test]
    fn test_schedule_skips_settle_when_testing() {
        let schedule = GraceSchedule::from_config(&config(), true);
        assert_eq!(schedule.web_flush, Duration::from_secs(1));
        assert_eq!(schedule.post_join, Duration::from_secs(1));
        assert_eq!(schedule.settle, None);

        let schedule = GraceSchedule::from_config(&config(), false);
        assert_eq!(schedule.settle, Some(Duration::from_secs(4)));
    }

    #[test]
    fn test_signal_is_one_shot() {
        let coordinator = ShutdownCoordinator::new(&config(), true);
        assert_eq!(coordinator.state(), ShutdownState::Running);
        assert!(coordinator.signal("SIGINT"));
        assert!(!coordinator.signal("SIGTERM"));
        assert_eq!(coordinator.state(), ShutdownState::Signaled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_session_waits_post_join_only() {
        let coordinator = ShutdownCoordinator::new(&config(), true);
        let started = tokio::time::Instant::now();

        let report = coordinator
            .shutdown(ShutdownSession {
                handles: Vec::new(),
                event_poller: None,
                store: None,
                mqueue: None,
            })
            .await;

        assert!(report.completed);
        assert_eq!(started.elapsed(), Duration::from_secs(1));
        assert_eq!(coordinator.state(), ShutdownState::Terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_sequence_is_refused() {
        let coordinator = ShutdownCoordinator::new(&config(), true);
        let empty = || ShutdownSession {
            handles: Vec::new(),
            event_poller: None,
            store: None,
            mqueue: None,
        };

        assert!(coordinator.shutdown(empty()).await.completed);
        assert!(!coordinator.shutdown(empty()).await.completed);
    }
}
