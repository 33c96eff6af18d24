//! Outbound message queue.
//!
//! Subsystems push messages meant for chat channels; the bot connection
//! drains them and writes them to the gateway. Messages still pending at
//! shutdown are persisted to the `mqueue` store table and reloaded on the
//! next start, so a process without a bot connection hands its messages to
//! the next one that has one.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::common::store::{ConfigStore, StoreError};

/// Table the queue registers in the config store.
pub const MQUEUE_TABLE: &str = "mqueue";

/// A message waiting to be sent to a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel_id: u64,
    pub content: String,
    /// Plugin or feed that produced the message.
    pub source: String,
}

/// FIFO of outbound messages shared by all subsystems.
#[derive(Debug, Default)]
pub struct MessageQueue {
    pending: Mutex<VecDeque<OutboundMessage>>,
    notify: Notify,
}

impl MessageQueue {
    /// Initialize the queue's backing storage and reload persisted messages.
    pub fn init_stores(store: &ConfigStore) -> Result<Self, StoreError> {
        store.register_table(MQUEUE_TABLE)?;

        let mut pending = VecDeque::new();
        for (key, value) in store.rows(MQUEUE_TABLE) {
            match serde_json::from_value::<OutboundMessage>(value) {
                Ok(message) => pending.push_back(message),
                Err(e) => tracing::warn!(key = %key, error = %e, "Skipping malformed queued message"),
            }
        }
        if !pending.is_empty() {
            tracing::info!(pending = pending.len(), "Reloaded queued messages");
        }

        Ok(Self {
            pending: Mutex::new(pending),
            notify: Notify::new(),
        })
    }

    /// Replace the store table's contents with the pending messages.
    pub fn persist(&self, store: &ConfigStore) -> Result<usize, StoreError> {
        let pending = self.pending.lock().expect("mqueue mutex poisoned");
        store.clear_table(MQUEUE_TABLE)?;
        for (seq, message) in pending.iter().enumerate() {
            let value = serde_json::to_value(message)?;
            store.put(MQUEUE_TABLE, &format!("{seq:010}"), value)?;
        }
        Ok(pending.len())
    }

    pub fn push(&self, message: OutboundMessage) {
        self.pending
            .lock()
            .expect("mqueue mutex poisoned")
            .push_back(message);
        self.notify.notify_one();
    }

    /// Take up to `max` messages in FIFO order.
    pub fn drain(&self, max: usize) -> Vec<OutboundMessage> {
        let mut pending = self.pending.lock().expect("mqueue mutex poisoned");
        let n = max.min(pending.len());
        pending.drain(..n).collect()
    }

    /// Put unsent messages back at the head of the queue, keeping their order.
    pub fn requeue_front(&self, messages: Vec<OutboundMessage>) {
        if messages.is_empty() {
            return;
        }
        let mut pending = self.pending.lock().expect("mqueue mutex poisoned");
        for message in messages.into_iter().rev() {
            pending.push_front(message);
        }
        drop(pending);
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.pending.lock().expect("mqueue mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until a message is pushed.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::StoreConfig;

    fn msg(n: u64) -> OutboundMessage {
        OutboundMessage {
            channel_id: n,
            content: format!("message {n}"),
            source: "test".into(),
        }
    }

    #[test]
    fn test_drain_is_fifo_and_bounded() {
        let queue = MessageQueue::default();
        for n in 0..5 {
            queue.push(msg(n));
        }

        let first = queue.drain(3);
        assert_eq!(first.iter().map(|m| m.channel_id).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.drain(10).len(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_requeue_front_keeps_order() {
        let queue = MessageQueue::default();
        for n in 0..4 {
            queue.push(msg(n));
        }

        let mut batch = queue.drain(3);
        batch.remove(0);
        queue.requeue_front(batch);

        let ids: Vec<u64> = queue.drain(10).iter().map(|m| m.channel_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_pending_messages_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            data_dir: dir.path().to_string_lossy().into_owned(),
        };

        let store = ConfigStore::connect(&config).await.unwrap();
        store.init_databases().await.unwrap();
        let queue = MessageQueue::init_stores(&store).unwrap();
        for n in 0..12 {
            queue.push(msg(n));
        }
        queue.drain(2);
        assert_eq!(queue.persist(&store).unwrap(), 10);
        store.flush().await.unwrap();

        let reopened = ConfigStore::connect(&config).await.unwrap();
        reopened.init_databases().await.unwrap();
        let reloaded = MessageQueue::init_stores(&reopened).unwrap();
        let ids: Vec<u64> = reloaded.drain(20).iter().map(|m| m.channel_id).collect();
        assert_eq!(ids, (2..12).collect::<Vec<_>>());

        // Emptied queue clears the table.
        assert_eq!(reloaded.persist(&reopened).unwrap(), 0);
        assert!(reopened.rows(MQUEUE_TABLE).is_empty());
    }

    #[tokio::test]
    async fn test_push_wakes_waiter() {
        let queue = std::sync::Arc::new(MessageQueue::default());
        let q = queue.clone();
        let waiter = tokio::spawn(async move { q.notified().await });
        queue.push(msg(1));
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }
}
