//! Turn coordinator
//!
//! Consumes the merged event stream and decides what goes into the
//! scratchpad, when a draft becomes queued, and when the queued task may be
//! irrevocably handed to the main agent. The coordinator is a plain owned
//! value driven by a single consumer loop; it performs no I/O and reports
//! everything it wants done as [`Intent`]s.
//!
//! ```text
//!   ScratchpadState: Empty <-> Buffered
//!   QueueState:      None -> Queued -> Dispatching -> Dispatched -> None
//!                            ^   |         |
//!                            |   +-(work / cancel / clear)-> None
//!                            +---------(failure)
//! ```

mod gate;
mod scratchpad;

use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

pub use gate::{QueueGate, QueuedTask};
pub use scratchpad::{Scratchpad, ScratchpadState};

use crate::agent::{AgentContext, AgentContextUpdate};
use crate::config::DispatchConfig;
use crate::events::{CommandKind, Event, EventKind, ScratchpadEdit};
use crate::sinks::{DispatchRequest, PresentationEvent};

/// Lifecycle of the queued task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    /// Nothing queued
    None,
    /// Waiting for the dispatch gate
    Queued,
    /// Handed to the dispatch sink, awaiting ack or failure
    Dispatching,
    /// Delivered; transient, immediately followed by `None`
    Dispatched,
}

impl std::fmt::Display for QueueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Queued => write!(f, "queued"),
            Self::Dispatching => write!(f, "dispatching"),
            Self::Dispatched => write!(f, "dispatched"),
        }
    }
}

/// Recoverable coordinator errors; none of them is fatal
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    #[error("malformed event: {reason}")]
    MalformedEvent { reason: String },

    #[error("patch anchor not found: {anchor:?}")]
    PatchConflict { anchor: String },

    #[error("a task is already queued")]
    AlreadyQueued,

    #[error("scratchpad is empty, nothing to queue")]
    NothingToQueue,

    #[error("no held task to retry")]
    NothingToRetry,

    #[error("dispatch already in flight")]
    DispatchInFlight,

    #[error("dispatch failed: {reason}")]
    DispatchFailure { reason: String },

    #[error("stale agent context update (seq {seq}, last applied {last})")]
    StaleAgentContextUpdate { seq: u64, last: u64 },
}

impl CoordinatorError {
    /// Stable code used on the presentation stream
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MalformedEvent { .. } => "malformed_event",
            Self::PatchConflict { .. } => "patch_conflict",
            Self::AlreadyQueued => "already_queued",
            Self::NothingToQueue => "nothing_to_queue",
            Self::NothingToRetry => "nothing_to_retry",
            Self::DispatchInFlight => "dispatch_in_flight",
            Self::DispatchFailure { .. } => "dispatch_failure",
            Self::StaleAgentContextUpdate { .. } => "stale_agent_context",
        }
    }
}

/// Side effect requested by the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Show something to the user
    Present(PresentationEvent),
    /// Send a task to the main agent
    Dispatch(DispatchRequest),
    /// Stop the main agent's running task
    Interrupt,
}

/// Read-only view for UI clients and the state endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoordinatorSnapshot {
    pub scratchpad: String,
    pub revision: u64,
    pub scratchpad_state: ScratchpadState,
    pub queue_state: QueueState,
    pub queued: Option<QueuedTask>,
    pub countdown_seconds: Option<u64>,
    pub agent: AgentContext,
    pub brief_pending: bool,
    pub dispatch_delay_seconds: u64,
}

/// The turn/dispatch state machine
#[derive(Debug)]
pub struct TurnCoordinator {
    config: DispatchConfig,
    scratchpad: Scratchpad,
    gate: QueueGate,
    queue_state: QueueState,
    agent: AgentContext,
    last_agent_seq: Option<u64>,
    last_agent_update: Option<AgentContextUpdate>,
    /// Last applied update that announced a finished run
    last_finished_update: Option<AgentContextUpdate>,
    /// A run finished and its brief has not been shown yet
    awaiting_brief: bool,
    in_flight: Option<Uuid>,
    last_countdown: Option<u64>,
}

impl TurnCoordinator {
    #[must_use]
    pub fn new(config: DispatchConfig) -> Self {
        let gate = QueueGate::new(config.delay);
        Self {
            config,
            scratchpad: Scratchpad::new(),
            gate,
            queue_state: QueueState::None,
            agent: AgentContext::default(),
            last_agent_seq: None,
            last_agent_update: None,
            last_finished_update: None,
            awaiting_brief: false,
            in_flight: None,
            last_countdown: None,
        }
    }

    #[must_use]
    pub const fn queue_state(&self) -> QueueState {
        self.queue_state
    }

    #[must_use]
    pub const fn scratchpad(&self) -> &Scratchpad {
        &self.scratchpad
    }

    #[must_use]
    pub const fn queued(&self) -> Option<&QueuedTask> {
        self.gate.task()
    }

    #[must_use]
    pub const fn agent(&self) -> &AgentContext {
        &self.agent
    }

    #[must_use]
    pub const fn brief_pending(&self) -> bool {
        self.gate.brief_pending()
    }

    #[must_use]
    pub fn snapshot(&self, now: Instant) -> CoordinatorSnapshot {
        CoordinatorSnapshot {
            scratchpad: self.scratchpad.content().to_string(),
            revision: self.scratchpad.revision(),
            scratchpad_state: self.scratchpad.state(),
            queue_state: self.queue_state,
            queued: self.gate.task().cloned(),
            countdown_seconds: self.countdown(now),
            agent: self.agent.clone(),
            brief_pending: self.gate.brief_pending(),
            dispatch_delay_seconds: self.config.delay.as_secs(),
        }
    }

    /// Apply one event
    ///
    /// Never dispatches: call [`Self::poll_dispatch`] once no more events are
    /// buffered so cancels and interjections win over a satisfied gate.
    pub fn handle(&mut self, event: &Event) -> Vec<Intent> {
        tracing::debug!(seq = event.seq, channel = ?event.channel, "handling event");

        let mut out = Vec::new();
        let now = event.at;

        match &event.kind {
            EventKind::Utterance { text, is_final } => {
                if !*is_final || text.trim().is_empty() {
                    tracing::trace!(seq = event.seq, "ignoring partial utterance");
                } else {
                    let edit = ScratchpadEdit::Append {
                        content: text.clone(),
                    };
                    self.on_work(&edit, &mut out);
                }
            }
            EventKind::Work(edit) => self.on_work(edit, &mut out),
            EventKind::Command(kind) => self.on_command(*kind, event, &mut out),
            EventKind::AgentContext(update) => self.on_agent_context(update, &mut out),
            EventKind::DispatchAck { dispatch_id } => self.on_dispatch_ack(*dispatch_id, &mut out),
            EventKind::DispatchFailure {
                dispatch_id,
                reason,
            } => self.on_dispatch_failure(*dispatch_id, reason, now, &mut out),
            EventKind::Malformed { reason } => {
                tracing::warn!(seq = event.seq, channel = ?event.channel, %reason, "malformed event");
                report(
                    &CoordinatorError::MalformedEvent {
                        reason: reason.clone(),
                    },
                    &mut out,
                );
            }
        }

        self.gate.tick(now);
        out
    }

    /// Recompute timers and emit a countdown update when it changed
    pub fn tick(&mut self, now: Instant) -> Vec<Intent> {
        self.gate.tick(now);
        let mut out = Vec::new();
        if self.queue_state == QueueState::Queued {
            let countdown = self.countdown(now);
            if countdown != self.last_countdown {
                out.push(self.queue_changed(now));
            }
        }
        out
    }

    /// Hand the queued task to the dispatch sink if the gate allows it
    pub fn poll_dispatch(&mut self, now: Instant) -> Vec<Intent> {
        self.gate.tick(now);
        if self.queue_state != QueueState::Queued || !self.gate.is_satisfied() {
            return Vec::new();
        }
        let Some(task) = self.gate.task() else {
            return Vec::new();
        };

        let request = DispatchRequest {
            dispatch_id: Uuid::new_v4(),
            task_content: task.content.clone(),
        };
        let attempt = self.gate.record_attempt();
        self.in_flight = Some(request.dispatch_id);
        self.queue_state = QueueState::Dispatching;

        tracing::info!(
            dispatch_id = %request.dispatch_id,
            attempt,
            chars = request.task_content.len(),
            "dispatching queued task"
        );

        vec![self.queue_changed(now), Intent::Dispatch(request)]
    }

    fn on_work(&mut self, edit: &ScratchpadEdit, out: &mut Vec<Intent>) {
        let dequeued = self.queue_state == QueueState::Queued;
        if dequeued {
            self.dequeue(out);
        }

        let result = self.scratchpad.apply(edit);
        if result.is_ok() || dequeued {
            out.push(self.scratchpad_changed());
        }
        if let Err(e) = result {
            tracing::info!(error = %e, "scratchpad patch rejected");
            report(&e, out);
        }
    }

    fn on_command(&mut self, kind: CommandKind, event: &Event, out: &mut Vec<Intent>) {
        tracing::info!(seq = event.seq, command = ?kind, queue = %self.queue_state, "user command");

        match kind {
            CommandKind::Queue => self.on_queue(event, out),
            CommandKind::Cancel => match self.queue_state {
                QueueState::Queued => {
                    self.gate.disarm();
                    self.queue_state = QueueState::None;
                    out.push(self.queue_changed(event.at));
                }
                QueueState::Dispatching => report(&CoordinatorError::DispatchInFlight, out),
                QueueState::None | QueueState::Dispatched => {
                    tracing::debug!("cancel with nothing queued");
                }
            },
            CommandKind::Clear => {
                if self.queue_state == QueueState::Queued {
                    self.gate.disarm();
                    self.queue_state = QueueState::None;
                    out.push(self.queue_changed(event.at));
                }
                self.scratchpad.clear();
                out.push(self.scratchpad_changed());
            }
            CommandKind::Interrupt => {
                tracing::info!(agent = %self.agent.status, "interrupting main agent");
                out.push(Intent::Interrupt);
                out.push(Intent::Present(PresentationEvent::InterruptIssued));
            }
            CommandKind::Retry => {
                let held = self.queue_state == QueueState::Queued
                    && self.gate.task().is_some_and(|task| task.held);
                if held {
                    self.gate.reset_attempts();
                    self.gate.rearm(event.at);
                    out.push(self.queue_changed(event.at));
                } else {
                    report(&CoordinatorError::NothingToRetry, out);
                }
            }
        }
    }

    fn on_queue(&mut self, event: &Event, out: &mut Vec<Intent>) {
        if self.queue_state != QueueState::None {
            report(&CoordinatorError::AlreadyQueued, out);
            return;
        }
        if self.scratchpad.state() == ScratchpadState::Empty {
            report(&CoordinatorError::NothingToQueue, out);
            return;
        }

        let content = self.scratchpad.take();
        self.gate.arm(
            QueuedTask::new(content, event.at, event.received_at),
            self.config.delay,
        );
        self.queue_state = QueueState::Queued;

        out.push(self.scratchpad_changed());
        out.push(self.queue_changed(event.at));
    }

    fn on_agent_context(&mut self, update: &AgentContextUpdate, out: &mut Vec<Intent>) {
        if let (Some(seq), Some(last)) = (update.seq, self.last_agent_seq) {
            if seq <= last {
                let stale = CoordinatorError::StaleAgentContextUpdate { seq, last };
                tracing::debug!(error = %stale, "discarding agent update");
                return;
            }
        }
        if self.last_agent_update.as_ref() == Some(update) {
            tracing::debug!("discarding duplicate agent update");
            return;
        }
        // Unsequenced redelivery of a finished run must not replay its brief
        if update.just_finished && self.last_finished_update.as_ref() == Some(update) {
            tracing::debug!("discarding redelivered completion update");
            return;
        }

        self.agent.apply(update);
        self.gate.observe_agent(update.status.is_idle());
        self.last_agent_seq = update.seq.or(self.last_agent_seq);
        self.last_agent_update = Some(update.clone());

        if update.just_finished {
            tracing::info!("main agent finished a run");
            self.last_finished_update = Some(update.clone());
            self.awaiting_brief = true;
        }

        if self.awaiting_brief {
            if let Some(brief) = &update.completion_brief {
                let text: String = brief.trim().chars().take(self.config.brief_max_chars).collect();
                if !text.is_empty() {
                    out.push(Intent::Present(PresentationEvent::BriefReady { text }));
                }
                self.awaiting_brief = false;
            }
        }

        self.gate
            .set_brief_pending(self.awaiting_brief && self.config.require_brief);
    }

    fn on_dispatch_ack(&mut self, dispatch_id: Uuid, out: &mut Vec<Intent>) {
        if self.queue_state != QueueState::Dispatching || self.in_flight != Some(dispatch_id) {
            tracing::warn!(%dispatch_id, "ignoring ack for unknown dispatch");
            return;
        }

        self.in_flight = None;
        let task = self.gate.disarm().map(|task| task.content).unwrap_or_default();
        tracing::info!(%dispatch_id, "task delivered to main agent");

        self.last_countdown = None;
        out.push(Intent::Present(PresentationEvent::Dispatched { task }));
        out.push(Intent::Present(PresentationEvent::QueueStateChanged {
            state: QueueState::Dispatched,
            countdown_seconds: None,
        }));
        self.queue_state = QueueState::None;
        out.push(Intent::Present(PresentationEvent::QueueStateChanged {
            state: QueueState::None,
            countdown_seconds: None,
        }));
    }

    fn on_dispatch_failure(
        &mut self,
        dispatch_id: Uuid,
        reason: &str,
        now: Instant,
        out: &mut Vec<Intent>,
    ) {
        if self.queue_state != QueueState::Dispatching || self.in_flight != Some(dispatch_id) {
            tracing::warn!(%dispatch_id, "ignoring failure for unknown dispatch");
            return;
        }

        self.in_flight = None;
        self.queue_state = QueueState::Queued;
        let attempts = self.gate.task().map_or(0, |task| task.attempts);
        let will_retry = attempts < self.config.max_dispatch_attempts;
        if will_retry {
            self.gate.rearm(now);
        } else {
            self.gate.hold();
        }

        tracing::warn!(%dispatch_id, attempts, will_retry, %reason, "dispatch failed");

        out.push(Intent::Present(PresentationEvent::DispatchFailed {
            reason: reason.to_string(),
            attempts,
            will_retry,
        }));
        out.push(self.queue_changed(now));
    }

    fn dequeue(&mut self, out: &mut Vec<Intent>) {
        if let Some(task) = self.gate.disarm() {
            tracing::info!(chars = task.content.len(), "de-queued task back to scratchpad");
            self.scratchpad.restore(&task.content);
        }
        self.queue_state = QueueState::None;
        self.last_countdown = None;
        out.push(Intent::Present(PresentationEvent::QueueStateChanged {
            state: QueueState::None,
            countdown_seconds: None,
        }));
    }

    fn countdown(&self, now: Instant) -> Option<u64> {
        match self.queue_state {
            QueueState::Queued => self.gate.countdown(now),
            _ => None,
        }
    }

    fn queue_changed(&mut self, now: Instant) -> Intent {
        let countdown_seconds = self.countdown(now);
        self.last_countdown = countdown_seconds;
        Intent::Present(PresentationEvent::QueueStateChanged {
            state: self.queue_state,
            countdown_seconds,
        })
    }

    fn scratchpad_changed(&self) -> Intent {
        Intent::Present(PresentationEvent::ScratchpadChanged {
            content: self.scratchpad.content().to_string(),
            revision: self.scratchpad.revision(),
        })
    }
}

fn report(error: &CoordinatorError, out: &mut Vec<Intent>) {
    out.push(Intent::Present(PresentationEvent::Error {
        code: error.code().to_string(),
        message: error.to_string(),
    }));
}
