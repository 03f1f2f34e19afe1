use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;

use crate::engine::tracking::TrackingSession;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/tracking", get(current_session).delete(stop_tracking))
}

#[derive(Serialize)]
pub struct TrackingResponse {
    pub active: bool,
    pub session: Option<TrackingSession>,
}

async fn current_session(State(state): State<Arc<AppState>>) -> Json<TrackingResponse> {
    let session = state.coordinator.tracker().current().await;
    Json(TrackingResponse {
        active: session.is_some(),
        session,
    })
}

/// Stops whatever session is running; the response carries the session that was stopped.
async fn stop_tracking(State(state): State<Arc<AppState>>) -> Json<TrackingResponse> {
    let session = state.coordinator.tracker().stop().await;
    Json(TrackingResponse {
        active: false,
        session,
    })
}
