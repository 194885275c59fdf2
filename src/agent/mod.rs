//! Main agent context and delivery bridge
//!
//! The main agent is the slow, tool-using executor this gateway fronts.
//! Its status is pushed to us out of band; the coordinator only ever
//! observes it through [`AgentContextUpdate`] events.

mod bridge;

pub use bridge::{HttpAgentBridge, UnconfiguredBridge};

use serde::{Deserialize, Serialize};

/// Run status of the main agent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Waiting for work
    #[default]
    Idle,
    /// Running a task
    Busy,
    /// Last run ended in an error
    Error,
}

impl AgentStatus {
    /// Whether a new task may be handed to the agent
    #[must_use]
    pub const fn is_idle(self) -> bool {
        matches!(self, Self::Idle)
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Busy => write!(f, "busy"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A recent turn of the main agent, kept for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentTurn {
    pub role: String,
    pub content: String,
}

/// Status push from the main agent
///
/// `seq` is the producer's own sequence number. When present it decides
/// which of two racing updates is authoritative.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentContextUpdate {
    #[serde(default)]
    pub status: AgentStatus,
    #[serde(default)]
    pub current_task: Option<String>,
    #[serde(default)]
    pub turns: Vec<AgentTurn>,
    #[serde(default)]
    pub compressed_context: Option<String>,
    /// The agent has just completed a run
    #[serde(default)]
    pub just_finished: bool,
    /// Summary of the finished run, to be shown before any further dispatch
    #[serde(default)]
    pub completion_brief: Option<String>,
    #[serde(default)]
    pub seq: Option<u64>,
}

/// Last applied view of the main agent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AgentContext {
    pub status: AgentStatus,
    pub current_task: Option<String>,
    pub turns: Vec<AgentTurn>,
    pub compressed_context: Option<String>,
    pub just_finished: bool,
    pub completion_brief: Option<String>,
}

impl AgentContext {
    /// Overwrite the mirror with an update
    ///
    /// Compressed context is sticky: an update without one keeps the
    /// previous value.
    pub fn apply(&mut self, update: &AgentContextUpdate) {
        self.status = update.status;
        self.current_task.clone_from(&update.current_task);
        self.turns.clone_from(&update.turns);
        if update.compressed_context.is_some() {
            self.compressed_context.clone_from(&update.compressed_context);
        }
        self.just_finished = update.just_finished;
        self.completion_brief.clone_from(&update.completion_brief);
    }
}
