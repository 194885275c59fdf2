//! WebSocket handler for UI clients
//!
//! Clients receive a snapshot on connect and then every presentation event.
//! Anything they send (other than `ping`) is pushed into the event stream.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use super::ApiState;
use crate::coordinator::CoordinatorSnapshot;
use crate::events::Channel;
use crate::sinks::PresentationEvent;

/// Connection-level message from client
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsControlIn {
    /// Ping to keep connection alive
    Ping,
}

/// Connection-level message to client
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsControl {
    /// Full state, sent on connect
    Snapshot { state: CoordinatorSnapshot },
    /// Pong response
    Pong,
    /// Client fell behind and missed events
    Lagged { skipped: u64 },
}

/// Outgoing WebSocket message to client
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum WsOutgoing {
    Presentation(PresentationEvent),
    Control(WsControl),
}

/// Build WebSocket router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new().route("/ws", get(ws_upgrade)).with_state(state)
}

/// Handle WebSocket upgrade request
async fn ws_upgrade(
    State(state): State<Arc<ApiState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<ApiState>) {
    let (mut sender, mut receiver) = socket.split();

    // The loop publishes its snapshot before presenting, so subscribing first
    // can repeat an event the snapshot already reflects but never drop one
    let events = BroadcastStream::new(state.presenter.subscribe());

    let snapshot = WsOutgoing::Control(WsControl::Snapshot {
        state: state.snapshot.borrow().clone(),
    });
    if let Ok(msg) = serde_json::to_string(&snapshot) {
        if sender.send(Message::Text(msg.into())).await.is_err() {
            return;
        }
    }

    tracing::info!(clients = state.presenter.client_count(), "WebSocket connected");

    let (tx, mut rx) = mpsc::channel::<WsOutgoing>(32);

    // Forward queued messages to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(text) = serde_json::to_string(&msg) {
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    // Forward presentation events
    let event_tx = tx.clone();
    let mut event_task = tokio::spawn(async move {
        let mut events = events;
        while let Some(item) = events.next().await {
            let msg = match item {
                Ok(event) => WsOutgoing::Presentation(event),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "WebSocket client lagging");
                    WsOutgoing::Control(WsControl::Lagged { skipped })
                }
            };
            if event_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    // Handle incoming messages
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if serde_json::from_str::<WsControlIn>(&text).is_ok() {
                        let _ = tx.send(WsOutgoing::Control(WsControl::Pong)).await;
                        continue;
                    }
                    if let Err(e) = state.producer.submit_json(&text, Channel::Ui) {
                        tracing::error!(error = %e, "dropping WebSocket event");
                        let error = PresentationEvent::Error {
                            code: "unavailable".to_string(),
                            message: e.to_string(),
                        };
                        let _ = tx.send(WsOutgoing::Presentation(error)).await;
                    }
                }
                Message::Ping(data) => {
                    tracing::trace!(len = data.len(), "received ping");
                }
                Message::Close(_) => {
                    tracing::info!("WebSocket closed by client");
                    break;
                }
                _ => {}
            }
        }
    });

    // Wait for any task to complete
    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
            event_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
            event_task.abort();
        }
        _ = &mut event_task => {
            send_task.abort();
            recv_task.abort();
        }
    }

    tracing::info!("WebSocket disconnected");
}
