//! Inbound event model
//!
//! Every input the coordinator reacts to (speech, UI commands, main agent
//! status pushes, dispatch results) is normalized into an [`Event`] and
//! delivered through a single ordered [`EventSource`].

mod source;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

pub use source::{EventProducer, EventSource};

use crate::agent::AgentContextUpdate;

/// Producer an event arrived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Speech pipeline (finalized transcriptions)
    Speech,
    /// UI socket or HTTP commands
    Ui,
    /// Main agent status callbacks
    Agent,
    /// Results of dispatch attempts
    Dispatch,
}

/// An edit to the scratchpad draft
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ScratchpadEdit {
    /// Replace the whole draft
    Set { content: String },
    /// Add to the end of the draft
    Append { content: String },
    /// Replace the first occurrence of `find` with `replace`
    Patch { find: String, replace: String },
}

/// Explicit user command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Queue the scratchpad for dispatch
    Queue,
    /// Drop the queued task
    Cancel,
    /// Empty the scratchpad
    Clear,
    /// Stop the main agent's running task
    Interrupt,
    /// Re-arm a task that used up its dispatch attempts
    Retry,
}

fn default_final() -> bool {
    true
}

/// Wire form of an inbound event, as sent by UI clients and callbacks
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundPayload {
    /// Transcribed or typed user text
    Utterance {
        text: String,
        #[serde(default = "default_final")]
        is_final: bool,
    },
    /// Structured draft edit (e.g. from the proxy model's tool call)
    Work { edit: ScratchpadEdit },
    /// Explicit UI action
    Command { kind: CommandKind },
    /// Main agent status push
    AgentContext(AgentContextUpdate),
}

impl InboundPayload {
    /// Channel this payload naturally belongs to
    #[must_use]
    pub const fn channel(&self) -> Channel {
        match self {
            Self::Utterance { .. } => Channel::Speech,
            Self::Work { .. } | Self::Command { .. } => Channel::Ui,
            Self::AgentContext(_) => Channel::Agent,
        }
    }
}

/// What happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Utterance { text: String, is_final: bool },
    Work(ScratchpadEdit),
    Command(CommandKind),
    AgentContext(AgentContextUpdate),
    DispatchAck { dispatch_id: Uuid },
    DispatchFailure { dispatch_id: Uuid, reason: String },
    /// A producer sent something we could not parse
    Malformed { reason: String },
}

impl From<InboundPayload> for EventKind {
    fn from(payload: InboundPayload) -> Self {
        match payload {
            InboundPayload::Utterance { text, is_final } => Self::Utterance { text, is_final },
            InboundPayload::Work { edit } => Self::Work(edit),
            InboundPayload::Command { kind } => Self::Command(kind),
            InboundPayload::AgentContext(update) => Self::AgentContext(update),
        }
    }
}

/// A sequenced, timestamped event
#[derive(Debug, Clone)]
pub struct Event {
    /// Position in the merged stream, strictly increasing
    pub seq: u64,
    pub channel: Channel,
    /// Arrival time on the monotonic clock
    pub at: Instant,
    /// Arrival time on the wall clock
    pub received_at: DateTime<Utc>,
    pub kind: EventKind,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentStatus;

    #[test]
    fn parses_utterance_with_default_final() {
        let payload: InboundPayload =
            serde_json::from_str(r#"{"type":"utterance","text":"fix the login bug"}"#).unwrap();
        assert_eq!(
            payload,
            InboundPayload::Utterance {
                text: "fix the login bug".to_string(),
                is_final: true,
            }
        );
        assert_eq!(payload.channel(), Channel::Speech);
    }

    #[test]
    fn parses_patch_edit() {
        let payload: InboundPayload = serde_json::from_str(
            r#"{"type":"work","edit":{"mode":"patch","find":"login","replace":"signup"}}"#,
        )
        .unwrap();
        assert_eq!(
            EventKind::from(payload),
            EventKind::Work(ScratchpadEdit::Patch {
                find: "login".to_string(),
                replace: "signup".to_string(),
            })
        );
    }

    #[test]
    fn parses_agent_context() {
        let payload: InboundPayload = serde_json::from_str(
            r#"{"type":"agent_context","status":"idle","just_finished":true,"completion_brief":"Done.","seq":4}"#,
        )
        .unwrap();
        let InboundPayload::AgentContext(update) = payload else {
            panic!("expected agent context");
        };
        assert_eq!(update.status, AgentStatus::Idle);
        assert!(update.just_finished);
        assert_eq!(update.completion_brief.as_deref(), Some("Done."));
        assert_eq!(update.seq, Some(4));
    }

    #[test]
    fn rejects_unknown_command() {
        let result = serde_json::from_str::<InboundPayload>(r#"{"type":"command","kind":"launch"}"#);
        assert!(result.is_err());
    }
}
