//! Coordinator state endpoint

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};

use super::ApiState;
use crate::coordinator::CoordinatorSnapshot;

/// Latest snapshot published by the coordinator loop
async fn get_state(State(state): State<Arc<ApiState>>) -> Json<CoordinatorSnapshot> {
    Json(state.snapshot.borrow().clone())
}

/// Build state router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/state", get(get_state))
        .with_state(state)
}
