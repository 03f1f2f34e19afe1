use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;

use crate::engine::return_machine::ReturnEvent;
use crate::error::AppError;
use crate::models::return_request::{ReturnId, ReturnRequest};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/returns", get(list_pending_returns))
        .route("/returns/:id/transitions", post(request_return_transition))
}

async fn list_pending_returns(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ReturnRequest>>, AppError> {
    let returns = state.coordinator.pending_returns().await?;
    Ok(Json(returns))
}

async fn request_return_transition(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(event): Json<ReturnEvent>,
) -> Result<Json<ReturnRequest>, AppError> {
    let request = state
        .coordinator
        .request_return_transition(&ReturnId(id), event)
        .await?;
    Ok(Json(request))
}
