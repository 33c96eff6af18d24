//! Subsystem launcher.
//!
//! # Responsibilities
//! - Build each subsystem the run mode selects
//! - Spawn its `run()` as an independent task and keep a handle to it
//! - Always start the event bus poller
//!
//! # Design Decisions
//! - A subsystem that fails to build is logged and skipped; the others
//!   still start
//! - A subsystem whose `run()` fails is logged; the others keep running
//! - The launcher never blocks on a subsystem

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;

use crate::common::pubsub::{EventBus, EventPollerHandle};
use crate::lifecycle::mode::RunMode;
use crate::observability::metrics;
use crate::subsystems::{Subsystem, SubsystemError, SubsystemKind, SubsystemProvider};

/// A running subsystem and its task.
pub struct SubsystemHandle {
    kind: SubsystemKind,
    subsystem: Arc<dyn Subsystem>,
    stopped: AtomicBool,
    task: JoinHandle<()>,
}

impl SubsystemHandle {
    /// Spawn `subsystem.run()` on the runtime.
    pub fn spawn(subsystem: Arc<dyn Subsystem>) -> Self {
        let kind = subsystem.kind();
        let runner = subsystem.clone();
        let task = tokio::spawn(async move {
            let started = Instant::now();
            match runner.run().await {
                Ok(()) => {
                    tracing::info!(subsystem = %kind, "Subsystem exited");
                }
                Err(e) => {
                    tracing::error!(subsystem = %kind, error = %e, "Subsystem failed");
                    metrics::record_subsystem_failed(kind.as_str());
                }
            }
            tracing::trace!(subsystem = %kind, elapsed = ?started.elapsed(), "Subsystem task done");
        });

        metrics::record_subsystem_started(kind.as_str());
        tracing::info!(subsystem = %kind, "Subsystem started");

        Self {
            kind,
            subsystem,
            stopped: AtomicBool::new(false),
            task,
        }
    }

    pub fn kind(&self) -> SubsystemKind {
        self.kind
    }

    /// Invoke the subsystem's stop routine. Only the first call reaches it.
    pub async fn stop(&self) -> Result<(), SubsystemError> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::info!(subsystem = %self.kind, "Stopping subsystem");
        self.subsystem.stop().await
    }

    /// Wait for the subsystem's task to exit.
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            tracing::warn!(subsystem = %self.kind, error = %e, "Subsystem task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Everything the launcher started.
pub struct Launched {
    pub handles: Vec<SubsystemHandle>,
    pub event_poller: EventPollerHandle,
}

/// Start every subsystem `mode` selects, then the event poller.
pub fn launch(
    mode: &RunMode,
    provider: &dyn SubsystemProvider,
    events: &Arc<EventBus>,
) -> Launched {
    let mut handles = Vec::new();

    if mode.launches_anything() {
        if mode.run_bot() {
            start(SubsystemKind::BotConnection, provider.bot(), &mut handles);
        }
        if mode.run_web() {
            start(SubsystemKind::WebServer, provider.web(), &mut handles);
        }
        if mode.run_feeds() {
            start(
                SubsystemKind::FeedPool,
                provider.feeds(mode.feed_names()),
                &mut handles,
            );
        }
    }

    let event_poller = events.spawn_poller();

    tracing::info!(
        started = handles.len(),
        subsystems = ?handles.iter().map(|h| h.kind()).collect::<Vec<_>>(),
        "Launch complete"
    );

    Launched {
        handles,
        event_poller,
    }
}

fn start(
    kind: SubsystemKind,
    built: Result<Arc<dyn Subsystem>, SubsystemError>,
    handles: &mut Vec<SubsystemHandle>,
) {
    match built {
        Ok(subsystem) => handles.push(SubsystemHandle::spawn(subsystem)),
        Err(e) => {
            tracing::error!(subsystem = %kind, error = %e, "Failed to start subsystem");
            metrics::record_subsystem_failed(kind.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::RunFlags;
    use crate::config::schema::{default_feeds, PoolConfig};
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::atomic::AtomicUsize;

    use crate::common::stop::StopSignal;

    struct Idle {
        kind: SubsystemKind,
        stop: StopSignal,
        stops: AtomicUsize,
    }

    impl Idle {
        fn new(kind: SubsystemKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                stop: StopSignal::new(),
                stops: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Subsystem for Idle {
        fn kind(&self) -> SubsystemKind {
            self.kind
        }

        async fn run(self: Arc<Self>) -> Result<(), SubsystemError> {
            self.stop.wait().await;
            Ok(())
        }

        async fn stop(&self) -> Result<(), SubsystemError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.stop.trigger();
            Ok(())
        }
    }

    struct Provider {
        web_fails: bool,
    }

    impl SubsystemProvider for Provider {
        fn bot(&self) -> Result<Arc<dyn Subsystem>, SubsystemError> {
            Ok(Idle::new(SubsystemKind::BotConnection))
        }

        fn web(&self) -> Result<Arc<dyn Subsystem>, SubsystemError> {
            if self.web_fails {
                return Err(SubsystemError::Other("port in use".into()));
            }
            Ok(Idle::new(SubsystemKind::WebServer))
        }

        fn feeds(&self, _names: &BTreeSet<String>) -> Result<Arc<dyn Subsystem>, SubsystemError> {
            Ok(Idle::new(SubsystemKind::FeedPool))
        }
    }

    fn mode(flags: RunFlags) -> RunMode {
        RunMode::resolve(&flags, &PoolConfig::default(), &default_feeds()).unwrap()
    }

    #[tokio::test]
    async fn test_launch_all_in_order() {
        let events = Arc::new(EventBus::new(4));
        let launched = launch(
            &mode(RunFlags { all: true, ..Default::default() }),
            &Provider { web_fails: false },
            &events,
        );

        let kinds: Vec<_> = launched.handles.iter().map(|h| h.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                SubsystemKind::BotConnection,
                SubsystemKind::WebServer,
                SubsystemKind::FeedPool
            ]
        );
        launched.event_poller.join().await;
    }

    #[tokio::test]
    async fn test_failed_build_does_not_block_others() {
        let events = Arc::new(EventBus::new(4));
        let launched = launch(
            &mode(RunFlags { bot: true, web: true, ..Default::default() }),
            &Provider { web_fails: true },
            &events,
        );

        assert_eq!(launched.handles.len(), 1);
        assert_eq!(launched.handles[0].kind(), SubsystemKind::BotConnection);
    }

    #[tokio::test]
    async fn test_dry_run_starts_only_poller() {
        let events = Arc::new(EventBus::new(4));
        let launched = launch(
            &mode(RunFlags { all: true, dry: true, ..Default::default() }),
            &Provider { web_fails: false },
            &events,
        );

        assert!(launched.handles.is_empty());
        assert!(!launched.event_poller.is_finished());
    }

    #[tokio::test]
    async fn test_handle_stops_once() {
        let idle = Idle::new(SubsystemKind::BotConnection);
        let handle = SubsystemHandle::spawn(idle.clone());

        assert!(!handle.is_finished());
        handle.stop().await.unwrap();
        handle.stop().await.unwrap();
        handle.wait().await;

        assert_eq!(idle.stops.load(Ordering::SeqCst), 1);
    }
}
