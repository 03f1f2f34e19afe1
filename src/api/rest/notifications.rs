use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::engine::notifications::{route_notification, NotificationPayload, Route};
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/notifications/route", post(route))
        .route("/push-token", post(register_push_token))
}

#[derive(Deserialize)]
pub struct PushTokenRequest {
    pub token: String,
}

async fn route(Json(payload): Json<NotificationPayload>) -> Json<Route> {
    Json(route_notification(&payload))
}

async fn register_push_token(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PushTokenRequest>,
) -> Result<StatusCode, AppError> {
    state.coordinator.register_push_token(&payload.token).await?;
    Ok(StatusCode::NO_CONTENT)
}
