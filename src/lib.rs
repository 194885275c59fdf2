//! Parley Gateway - turn and dispatch coordinator for a voice proxy
//!
//! A user talks to a fast proxy while a slower main agent does the real
//! work. This library decides what the user is drafting, when a draft is
//! ready, and when it is safe to hand it to the main agent:
//! - Scratchpad drafting from utterances and structured edits
//! - A cancellable queue with a delay, idle and completion-brief gate
//! - Main agent status tracking and brief forwarding
//! - HTTP/WebSocket surface for UI clients and agent callbacks
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                     Producers                        │
//! │   Speech  │  UI (HTTP/WS)  │  Agent  │  Dispatch    │
//! └────────────────────┬────────────────────────────────┘
//!                      │ EventSource (single ordered stream)
//! ┌────────────────────▼────────────────────────────────┐
//! │                 TurnCoordinator                      │
//! │   Scratchpad  │  QueueGate  │  AgentContext         │
//! └───────────┬─────────────────────────┬───────────────┘
//!             │                         │
//! ┌───────────▼───────────┐ ┌───────────▼───────────────┐
//! │  Presentation sink    │ │  Dispatch sink            │
//! │  (WebSocket clients)  │ │  (main agent HTTP bridge) │
//! └───────────────────────┘ └───────────────────────────┘
//! ```

pub mod agent;
pub mod api;
pub mod config;
pub mod coordinator;
pub mod daemon;
pub mod error;
pub mod events;
pub mod sinks;

pub use agent::{AgentContext, AgentContextUpdate, AgentStatus, HttpAgentBridge};
pub use config::Config;
pub use coordinator::{CoordinatorError, Intent, QueueState, TurnCoordinator};
pub use daemon::{CoordinatorLoop, Daemon};
pub use error::{Error, Result};
pub use events::{Event, EventProducer, EventSource};
pub use sinks::{DispatchSink, PresentationEvent, PresentationSink};
