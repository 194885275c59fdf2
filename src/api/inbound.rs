//! Inbound event endpoints
//!
//! Bodies are taken as raw text so unparsable payloads still reach the
//! coordinator as `Malformed` events instead of being rejected here.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::post,
};
use serde::Serialize;

use super::ApiState;
use crate::agent::AgentContextUpdate;
use crate::events::{Channel, EventKind};

/// Acknowledgement for an accepted event
#[derive(Debug, Serialize)]
pub struct Accepted {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn respond(result: crate::Result<()>) -> (StatusCode, Json<Accepted>) {
    match result {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(Accepted {
                accepted: true,
                error: None,
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "dropping inbound event");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(Accepted {
                    accepted: false,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

/// Any user or agent payload
async fn post_event(
    State(state): State<Arc<ApiState>>,
    body: String,
) -> (StatusCode, Json<Accepted>) {
    respond(state.producer.submit_json(&body, Channel::Ui))
}

/// Status callback from the main agent
async fn post_agent_context(
    State(state): State<Arc<ApiState>>,
    body: String,
) -> (StatusCode, Json<Accepted>) {
    let result = match serde_json::from_str::<AgentContextUpdate>(&body) {
        Ok(update) => state.producer.agent_context(update),
        Err(e) => state.producer.send(
            Channel::Agent,
            EventKind::Malformed {
                reason: e.to_string(),
            },
        ),
    };
    respond(result)
}

/// Build inbound router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/events", post(post_event))
        .route("/agent/context", post(post_agent_context))
        .with_state(state)
}
