//! Bot gateway connection.
//!
//! # Responsibilities
//! - Hold a websocket session to the gateway, reconnecting with backoff
//! - Dispatch prefixed chat messages to the compiled command set
//! - Forward gateway events onto the event bus
//! - Write queued outbound messages back to the gateway
//!
//! # Gateway Frames
//! ```text
//! ← {"op":"message_create","channel_id":1,"content":"-ping"}
//! ← {"op":"event","name":"clear_cache","target":7,"payload":{}}
//! → {"op":"send_message","channel_id":1,"content":"..."}
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::{connect_async, tungstenite, tungstenite::Message};

use crate::commands::Command;
use crate::common::{Event, MessageQueue, OutboundMessage, StopSignal};
use crate::config::BotConfig;
use crate::lifecycle::startup::Dependencies;
use crate::observability::metrics;
use crate::resilience::BackoffPolicy;
use crate::subsystems::{Subsystem, SubsystemError, SubsystemKind};

/// Messages written per wakeup.
const SEND_BATCH: usize = 32;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum InboundFrame {
    MessageCreate { channel_id: u64, content: String },
    Event(Event),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OutboundFrame {
    SendMessage { channel_id: u64, content: String },
}

impl From<OutboundMessage> for OutboundFrame {
    fn from(message: OutboundMessage) -> Self {
        OutboundFrame::SendMessage {
            channel_id: message.channel_id,
            content: message.content,
        }
    }
}

enum SessionEnd {
    Stopped,
    Closed,
}

pub struct BotConnection {
    config: BotConfig,
    backoff: BackoffPolicy,
    deps: Arc<Dependencies>,
    stop: StopSignal,
}

impl BotConnection {
    pub fn new(config: BotConfig, deps: Arc<Dependencies>) -> Result<Self, SubsystemError> {
        url::Url::parse(&config.gateway_url)
            .map_err(|e| SubsystemError::Gateway(format!("invalid gateway url: {e}")))?;
        let backoff = BackoffPolicy::from_millis(config.reconnect_base_ms, config.reconnect_max_ms);
        Ok(Self {
            config,
            backoff,
            deps,
            stop: StopSignal::new(),
        })
    }

    async fn session(&self) -> Result<SessionEnd, SubsystemError> {
        let (socket, _) = tokio::select! {
            _ = self.stop.wait() => return Ok(SessionEnd::Stopped),
            connected = connect_async(self.config.gateway_url.as_str()) => {
                connected.map_err(|e| SubsystemError::Gateway(e.to_string()))?
            }
        };
        tracing::info!(gateway = %self.config.gateway_url, "Connected to gateway");

        let (mut sink, mut stream) = socket.split();
        loop {
            send_pending(&self.deps.mqueue, &mut sink).await?;

            tokio::select! {
                _ = self.stop.wait() => {
                    if let Err(e) = sink.close().await {
                        tracing::debug!(error = %e, "Gateway close failed");
                    }
                    return Ok(SessionEnd::Stopped);
                }
                _ = self.deps.mqueue.notified() => {}
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_frame(text.as_str()).await,
                    Some(Ok(Message::Close(_))) | None => return Ok(SessionEnd::Closed),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(SubsystemError::Gateway(e.to_string())),
                },
            }
        }
    }

    async fn handle_frame(&self, text: &str) {
        let frame: InboundFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring malformed gateway frame");
                return;
            }
        };

        match frame {
            InboundFrame::MessageCreate { channel_id, content } => {
                self.dispatch_command(channel_id, &content).await
            }
            InboundFrame::Event(event) => {
                if let Err(e) = self.deps.events.publish(event) {
                    tracing::warn!(error = %e, "Dropped gateway event");
                }
            }
            InboundFrame::Unknown => {}
        }
    }

    async fn dispatch_command(&self, channel_id: u64, content: &str) {
        let Some((command, args)) = self
            .deps
            .commands
            .parse_invocation(&self.config.command_prefix, content)
        else {
            return;
        };

        let _permit = match self.deps.pool.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                tracing::warn!(command = %command.name, error = %e, "Dropping command");
                return;
            }
        };

        tracing::debug!(command = %command.name, plugin = %command.plugin, args, "Dispatching command");
        metrics::record_command_dispatched(&command.name);

        let content = if command.name == "help" {
            help_text(self.deps.commands.names())
        } else {
            reply_text(command, args)
        };
        self.deps.mqueue.push(OutboundMessage {
            channel_id,
            content,
            source: command.plugin.clone(),
        });
    }
}

/// Write one batch from the queue. On failure the failed message and the
/// rest of the batch go back to the head of the queue.
async fn send_pending<S>(queue: &MessageQueue, sink: &mut S) -> Result<(), SubsystemError>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let mut batch: VecDeque<OutboundMessage> = queue.drain(SEND_BATCH).into();
    while let Some(message) = batch.pop_front() {
        let sent = match serde_json::to_string(&OutboundFrame::from(message.clone())) {
            Ok(frame) => sink.send(Message::text(frame)).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = sent {
            batch.push_front(message);
            tracing::warn!(unsent = batch.len(), "Requeued unsent messages");
            queue.requeue_front(batch.into());
            return Err(SubsystemError::Gateway(e));
        }
    }
    Ok(())
}

fn help_text<'a>(names: impl Iterator<Item = &'a str>) -> String {
    format!("Commands: {}", names.collect::<Vec<_>>().join(", "))
}

fn reply_text(command: &Command, args: &str) -> String {
    if args.is_empty() {
        format!("{}: {}", command.name, command.description)
    } else {
        format!("{} ({}): {}", command.name, args, command.description)
    }
}

#[async_trait]
impl Subsystem for BotConnection {
    fn kind(&self) -> SubsystemKind {
        SubsystemKind::BotConnection
    }

    async fn run(self: Arc<Self>) -> Result<(), SubsystemError> {
        let mut attempt = 0u32;
        loop {
            match self.session().await {
                Ok(SessionEnd::Stopped) => break,
                Ok(SessionEnd::Closed) => {
                    tracing::warn!("Gateway closed the connection");
                    attempt = 0;
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "Gateway session failed");
                }
            }

            let delay = self.backoff.delay(attempt);
            attempt = attempt.saturating_add(1);
            tracing::debug!(delay = ?delay, "Reconnecting to gateway");
            tokio::select! {
                _ = self.stop.wait() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!("Bot connection stopped");
        Ok(())
    }

    async fn stop(&self) -> Result<(), SubsystemError> {
        self.stop.trigger();
        Ok(())
    }
}
