//! Cross-process event bus.
//!
//! # Responsibilities
//! - Let plugins subscribe handlers to named events during registration
//! - Accept published events from any task (e.g. the web `/events` endpoint)
//! - Dispatch pending events from one background poller task
//!
//! The poller has its own stop hook, but shutdown only joins it when
//! configured to; by default it is abandoned at process exit.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::common::stop::StopSignal;
use crate::observability::metrics;

/// A named event with an optional target (usually a guild ID).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    #[serde(default)]
    pub target: Option<u64>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Event {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: None,
            payload: serde_json::Value::Null,
        }
    }
}

pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PubSubError {
    #[error("event bus is full")]
    Full,

    #[error("event bus is closed")]
    Closed,

    #[error("event poller already running")]
    AlreadyPolling,
}

/// Event bus shared by plugins and subsystems.
pub struct EventBus {
    handlers: DashMap<String, Vec<EventHandler>>,
    tx: mpsc::Sender<Event>,
    rx: Mutex<Option<mpsc::Receiver<Event>>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            handlers: DashMap::new(),
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Add a handler for events named `name`.
    pub fn subscribe<F>(&self, name: &str, handler: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.handlers
            .entry(name.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Queue an event for dispatch without waiting.
    pub fn publish(&self, event: Event) -> Result<(), PubSubError> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PubSubError::Full,
            mpsc::error::TrySendError::Closed(_) => PubSubError::Closed,
        })
    }

    /// Invoke every handler subscribed to the event. Returns how many ran.
    pub fn dispatch(&self, event: &Event) -> usize {
        // Clone the handler list so handlers may subscribe without deadlocking.
        let handlers = match self.handlers.get(&event.name) {
            Some(handlers) => handlers.value().clone(),
            None => {
                tracing::trace!(event = %event.name, "No handlers for event");
                return 0;
            }
        };

        for handler in &handlers {
            handler(event);
        }
        metrics::record_event_dispatched(&event.name, handlers.len());
        handlers.len()
    }

    /// Dispatch events until `stop` fires. Only one poller may run.
    pub async fn poll_forever(&self, stop: StopSignal) -> Result<u64, PubSubError> {
        let mut rx = self
            .rx
            .lock()
            .expect("event bus mutex poisoned")
            .take()
            .ok_or(PubSubError::AlreadyPolling)?;

        tracing::info!("Event poller started");
        let mut dispatched = 0u64;
        loop {
            tokio::select! {
                _ = stop.wait() => break,
                event = rx.recv() => match event {
                    Some(event) => {
                        self.dispatch(&event);
                        dispatched += 1;
                    }
                    None => break,
                },
            }
        }

        tracing::info!(dispatched, "Event poller stopped");
        Ok(dispatched)
    }

    /// Start the poller as a background task.
    pub fn spawn_poller(self: &Arc<Self>) -> EventPollerHandle {
        let stop = StopSignal::new();
        let bus = self.clone();
        let task_stop = stop.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = bus.poll_forever(task_stop).await {
                tracing::error!(error = %e, "Event poller failed");
            }
        });
        EventPollerHandle { stop, task }
    }
}

/// Stop hook for the background event poller.
pub struct EventPollerHandle {
    stop: StopSignal,
    task: JoinHandle<()>,
}

impl EventPollerHandle {
    /// Ask the poller to exit after the current event.
    pub fn stop(&self) {
        self.stop.trigger();
    }

    /// Stop the poller and wait for it to exit.
    pub async fn join(self) {
        self.stop();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Event poller task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_poller_dispatches_to_subscribers() {
        let bus = Arc::new(EventBus::new(8));
        let seen = Arc::new(AtomicUsize::new(0));
        let s = seen.clone();
        bus.subscribe("clear_cache", move |event| {
            assert_eq!(event.target, Some(5));
            s.fetch_add(1, Ordering::SeqCst);
        });

        let poller = bus.spawn_poller();
        let mut event = Event::new("clear_cache");
        event.target = Some(5);
        bus.publish(event.clone()).unwrap();
        bus.publish(event).unwrap();
        bus.publish(Event::new("unhandled")).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        tokio::time::timeout(Duration::from_secs(1), poller.join())
            .await
            .expect("poller should stop when asked");
    }

    #[tokio::test]
    async fn test_only_one_poller() {
        let bus = Arc::new(EventBus::new(1));
        let first = bus.spawn_poller();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = bus.poll_forever(StopSignal::new()).await.unwrap_err();
        assert_eq!(err, PubSubError::AlreadyPolling);
        first.join().await;
    }

    #[test]
    fn test_publish_full() {
        let bus = EventBus::new(1);
        bus.publish(Event::new("a")).unwrap();
        assert_eq!(bus.publish(Event::new("b")), Err(PubSubError::Full));
    }
}
