//! Single ordered event stream fed by many producers

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

use super::{Channel, CommandKind, Event, EventKind, InboundPayload, ScratchpadEdit};
use crate::agent::AgentContextUpdate;
use crate::{Error, Result};

/// An event as stamped by its producer, before sequencing
#[derive(Debug)]
struct Envelope {
    channel: Channel,
    at: Instant,
    received_at: chrono::DateTime<Utc>,
    kind: EventKind,
}

/// Consumer end of the merged stream
///
/// Sequence numbers are assigned on delivery so they always follow the
/// order in which the coordinator sees events.
#[derive(Debug)]
pub struct EventSource {
    rx: mpsc::UnboundedReceiver<Envelope>,
    next_seq: u64,
}

/// Cloneable producer handle
#[derive(Debug, Clone)]
pub struct EventProducer {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl EventSource {
    /// Create a source and its first producer handle
    #[must_use]
    pub fn new() -> (Self, EventProducer) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx, next_seq: 1 }, EventProducer { tx })
    }

    /// Wait for the next event
    ///
    /// Returns `None` once every producer handle has been dropped.
    pub async fn next_event(&mut self) -> Option<Event> {
        let envelope = self.rx.recv().await?;
        Some(self.sequence(envelope))
    }

    /// Take every event already buffered, without waiting
    pub fn drain_ready(&mut self) -> Vec<Event> {
        let mut ready = Vec::new();
        while let Ok(envelope) = self.rx.try_recv() {
            ready.push(self.sequence(envelope));
        }
        ready
    }

    fn sequence(&mut self, envelope: Envelope) -> Event {
        let seq = self.next_seq;
        self.next_seq += 1;
        Event {
            seq,
            channel: envelope.channel,
            at: envelope.at,
            received_at: envelope.received_at,
            kind: envelope.kind,
        }
    }
}

impl EventProducer {
    /// Whether the consumer has shut down
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Push an event stamped with the current time
    ///
    /// # Errors
    ///
    /// Returns [`Error::EventSourceClosed`] if the consumer has shut down
    pub fn send(&self, channel: Channel, kind: EventKind) -> Result<()> {
        self.tx
            .send(Envelope {
                channel,
                at: Instant::now(),
                received_at: Utc::now(),
                kind,
            })
            .map_err(|_| Error::EventSourceClosed)
    }

    /// Push a parsed inbound payload on its natural channel
    ///
    /// # Errors
    ///
    /// Returns [`Error::EventSourceClosed`] if the consumer has shut down
    pub fn submit(&self, payload: InboundPayload) -> Result<()> {
        self.send(payload.channel(), payload.into())
    }

    /// Parse a raw JSON payload and push it
    ///
    /// Unparsable input is not dropped: it becomes a `Malformed` event on
    /// `origin` so the coordinator can surface it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EventSourceClosed`] if the consumer has shut down
    pub fn submit_json(&self, raw: &str, origin: Channel) -> Result<()> {
        match serde_json::from_str::<InboundPayload>(raw) {
            Ok(payload) => self.submit(payload),
            Err(e) => {
                tracing::debug!(channel = ?origin, error = %e, "unparsable inbound payload");
                self.send(
                    origin,
                    EventKind::Malformed {
                        reason: e.to_string(),
                    },
                )
            }
        }
    }

    /// Push a user utterance
    ///
    /// # Errors
    ///
    /// Returns [`Error::EventSourceClosed`] if the consumer has shut down
    pub fn utterance(&self, text: impl Into<String>, is_final: bool) -> Result<()> {
        self.send(
            Channel::Speech,
            EventKind::Utterance {
                text: text.into(),
                is_final,
            },
        )
    }

    /// Push a structured scratchpad edit
    ///
    /// # Errors
    ///
    /// Returns [`Error::EventSourceClosed`] if the consumer has shut down
    pub fn work(&self, edit: ScratchpadEdit) -> Result<()> {
        self.send(Channel::Ui, EventKind::Work(edit))
    }

    /// Push a user command
    ///
    /// # Errors
    ///
    /// Returns [`Error::EventSourceClosed`] if the consumer has shut down
    pub fn command(&self, kind: CommandKind) -> Result<()> {
        self.send(Channel::Ui, EventKind::Command(kind))
    }

    /// Push a main agent status update
    ///
    /// # Errors
    ///
    /// Returns [`Error::EventSourceClosed`] if the consumer has shut down
    pub fn agent_context(&self, update: AgentContextUpdate) -> Result<()> {
        self.send(Channel::Agent, EventKind::AgentContext(update))
    }

    /// Report a delivered dispatch
    ///
    /// # Errors
    ///
    /// Returns [`Error::EventSourceClosed`] if the consumer has shut down
    pub fn dispatch_ack(&self, dispatch_id: Uuid) -> Result<()> {
        self.send(Channel::Dispatch, EventKind::DispatchAck { dispatch_id })
    }

    /// Report a failed dispatch
    ///
    /// # Errors
    ///
    /// Returns [`Error::EventSourceClosed`] if the consumer has shut down
    pub fn dispatch_failure(&self, dispatch_id: Uuid, reason: impl Into<String>) -> Result<()> {
        self.send(
            Channel::Dispatch,
            EventKind::DispatchFailure {
                dispatch_id,
                reason: reason.into(),
            },
        )
    }
}
