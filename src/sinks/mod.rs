//! Outbound collaborators of the turn coordinator
//!
//! The coordinator never performs I/O itself. It emits intents which the
//! daemon hands to a [`PresentationSink`] (what the user sees and hears) or
//! a [`DispatchSink`] (what the main agent receives).

mod broadcast;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

pub use broadcast::BroadcastPresenter;

use crate::Result;
use crate::coordinator::QueueState;

/// A task handed to the main agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchRequest {
    /// Correlates the eventual ack or failure with this request
    pub dispatch_id: Uuid,
    pub task_content: String,
}

/// State and reply updates for UI clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PresentationEvent {
    /// Scratchpad draft changed
    ScratchpadChanged { content: String, revision: u64 },
    /// Queue moved to a new state; countdown is set only while armed
    QueueStateChanged {
        state: QueueState,
        countdown_seconds: Option<u64>,
    },
    /// The main agent's completion brief, to be spoken to the user
    BriefReady { text: String },
    /// An interrupt was sent to the running main agent task
    InterruptIssued,
    /// A task was delivered to the main agent
    Dispatched { task: String },
    /// A dispatch attempt failed
    DispatchFailed {
        reason: String,
        attempts: u32,
        will_retry: bool,
    },
    /// A recoverable error the user should see
    Error { code: String, message: String },
}

/// Renders coordinator output to the user
#[async_trait]
pub trait PresentationSink: Send + Sync {
    /// Deliver one event; returns once the event has been handed off
    async fn present(&self, event: PresentationEvent) -> Result<()>;
}

/// Delivers work to the main agent
#[async_trait]
pub trait DispatchSink: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Send a task to the main agent
    async fn dispatch(&self, request: &DispatchRequest) -> Result<()>;

    /// Stop whatever the main agent is currently running
    async fn interrupt(&self) -> Result<()>;
}
