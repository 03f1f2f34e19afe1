use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{post, put};
use axum::Json;
use axum::Router;

use crate::device::PermissionStatus;
use crate::error::AppError;
use crate::models::location::GeoPoint;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/device/permissions", put(set_permissions))
        .route("/device/location", post(push_location))
}

async fn set_permissions(
    State(state): State<Arc<AppState>>,
    Json(status): Json<PermissionStatus>,
) -> Json<PermissionStatus> {
    state.device.set_permissions(status);
    Json(state.device.permissions())
}

async fn push_location(
    State(state): State<Arc<AppState>>,
    Json(point): Json<GeoPoint>,
) -> Result<StatusCode, AppError> {
    if !(-90.0..=90.0).contains(&point.lat) || !(-180.0..=180.0).contains(&point.lng) {
        return Err(AppError::BadRequest(format!(
            "coordinates out of range: {}, {}",
            point.lat, point.lng
        )));
    }

    state.device.push_position(point);
    Ok(StatusCode::ACCEPTED)
}
