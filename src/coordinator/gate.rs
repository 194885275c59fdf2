//! Queue gate
//!
//! Holds the queued task and decides when it is eligible for dispatch.
//! The gate never acts on its own verdict; the coordinator does.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

/// Immutable snapshot of the scratchpad awaiting dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueuedTask {
    pub content: String,
    pub queued_at: DateTime<Utc>,
    /// Delay, idle and brief conditions all held at the last recompute
    pub dispatch_armed: bool,
    /// Dispatch attempts made so far
    pub attempts: u32,
    /// Automatic dispatch suspended until a manual retry
    pub held: bool,
    #[serde(skip)]
    armed_at: Instant,
}

impl QueuedTask {
    #[must_use]
    pub fn new(content: impl Into<String>, now: Instant, queued_at: DateTime<Utc>) -> Self {
        Self {
            content: content.into(),
            queued_at,
            dispatch_armed: false,
            attempts: 0,
            held: false,
            armed_at: now,
        }
    }

    /// When the delay timer was last started
    #[must_use]
    pub const fn armed_at(&self) -> Instant {
        self.armed_at
    }
}

/// Dispatch eligibility bookkeeping
#[derive(Debug, Clone)]
pub struct QueueGate {
    task: Option<QueuedTask>,
    delay: Duration,
    agent_idle: bool,
    brief_pending: bool,
    elapsed_ok: bool,
}

impl QueueGate {
    /// Create an empty gate; the agent is assumed idle until told otherwise
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self {
            task: None,
            delay,
            agent_idle: true,
            brief_pending: false,
            elapsed_ok: false,
        }
    }

    /// Install a freshly queued task and start its delay timer
    pub fn arm(&mut self, task: QueuedTask, delay: Duration) {
        self.delay = delay;
        self.elapsed_ok = false;
        self.task = Some(QueuedTask {
            dispatch_armed: false,
            ..task
        });
    }

    /// Remove the queued task, cancelling its timer
    pub fn disarm(&mut self) -> Option<QueuedTask> {
        self.elapsed_ok = false;
        self.task.take()
    }

    /// Restart the delay timer for the current task and lift any hold
    pub fn rearm(&mut self, now: Instant) {
        self.elapsed_ok = false;
        if let Some(task) = self.task.as_mut() {
            task.armed_at = now;
            task.dispatch_armed = false;
            task.held = false;
        }
    }

    /// Suspend automatic dispatch of the current task
    pub fn hold(&mut self) {
        if let Some(task) = self.task.as_mut() {
            task.held = true;
            task.dispatch_armed = false;
        }
    }

    /// Count a dispatch attempt, returning the new total
    pub fn record_attempt(&mut self) -> u32 {
        self.task.as_mut().map_or(0, |task| {
            task.attempts += 1;
            task.attempts
        })
    }

    /// Forget previous attempts (manual retry)
    pub fn reset_attempts(&mut self) {
        if let Some(task) = self.task.as_mut() {
            task.attempts = 0;
        }
    }

    /// Record the latest agent status
    pub const fn observe_agent(&mut self, idle: bool) {
        self.agent_idle = idle;
    }

    pub const fn set_brief_pending(&mut self, pending: bool) {
        self.brief_pending = pending;
    }

    #[must_use]
    pub const fn brief_pending(&self) -> bool {
        self.brief_pending
    }

    #[must_use]
    pub const fn task(&self) -> Option<&QueuedTask> {
        self.task.as_ref()
    }

    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Recompute `elapsed_ok` and the task's `dispatch_armed` flag
    pub fn tick(&mut self, now: Instant) {
        self.elapsed_ok = self
            .task
            .as_ref()
            .is_some_and(|task| now >= task.armed_at + self.delay);
        let satisfied = self.is_satisfied();
        if let Some(task) = self.task.as_mut() {
            task.dispatch_armed = satisfied;
        }
    }

    /// Whether the queued task may be dispatched now
    ///
    /// Reflects the state as of the last [`Self::tick`].
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.held)
            && self.agent_idle
            && self.elapsed_ok
            && !self.brief_pending
    }

    /// Whole seconds left on the delay timer, rounded up
    ///
    /// `None` when nothing is queued or the task is held.
    #[must_use]
    pub fn countdown(&self, now: Instant) -> Option<u64> {
        let task = self.task.as_ref().filter(|task| !task.held)?;
        let remaining = (task.armed_at + self.delay).saturating_duration_since(now);
        let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
        Some(secs)
    }
}
