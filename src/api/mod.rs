//! HTTP API server for the Parley gateway

pub mod health;
pub mod inbound;
pub mod state;
pub mod websocket;

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::coordinator::CoordinatorSnapshot;
use crate::events::EventProducer;
use crate::sinks::BroadcastPresenter;
use crate::{Error, Result};

/// Shared state for API handlers
pub struct ApiState {
    /// Handle into the coordinator's event stream
    pub producer: EventProducer,
    /// Fan-out of presentation events to WebSocket clients
    pub presenter: Arc<BroadcastPresenter>,
    /// Latest coordinator snapshot, refreshed by the loop
    pub snapshot: watch::Receiver<CoordinatorSnapshot>,
    /// Whether a main agent URL is configured
    pub agent_configured: bool,
}

/// Build the router with all routes
pub fn router(state: Arc<ApiState>) -> Router {
    // CORS layer for cross-origin requests from the UI
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest(
            "/api",
            inbound::router(Arc::clone(&state)).merge(state::router(Arc::clone(&state))),
        )
        .merge(websocket::router(Arc::clone(&state)))
        .merge(health::router())
        .merge(health::ready_router(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Serve the API on an already bound listener
///
/// # Errors
///
/// Returns error if the server fails while running
pub async fn serve(listener: TcpListener, state: Arc<ApiState>) -> Result<()> {
    axum::serve(listener, router(state))
        .await
        .map_err(|e| Error::Api(format!("API server error: {e}")))
}
