use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::engine::coordinator::{OrderView, TransitionOutcome};
use crate::engine::order_machine::OrderEvent;
use crate::engine::polling::PollReport;
use crate::error::AppError;
use crate::models::order::{DeliveryOrder, HistoryFilter, OrderId};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", get(list_active_orders))
        .route("/orders/history", get(order_history))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/transitions", post(request_transition))
        .route(
            "/orders/:id/live",
            post(start_polling).get(polling_report).delete(stop_polling),
        )
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub status: HistoryFilter,
}

#[derive(Deserialize, Default)]
pub struct StartPollingRequest {
    #[serde(default)]
    pub interval_ms: Option<u64>,
}

#[derive(Serialize)]
pub struct PollingResponse {
    pub order_id: OrderId,
    pub polling: bool,
    pub report: Option<PollReport>,
}

#[derive(Serialize)]
pub struct StopPollingResponse {
    pub order_id: OrderId,
    pub stopped: bool,
}

async fn list_active_orders(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DeliveryOrder>>, AppError> {
    let orders = state.coordinator.refresh_active_orders().await?;
    Ok(Json(orders))
}

async fn order_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<DeliveryOrder>>, AppError> {
    let orders = state.coordinator.order_history(query.status).await?;
    Ok(Json(orders))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderView>, AppError> {
    let view = state.coordinator.order_view(&OrderId(id)).await?;
    Ok(Json(view))
}

async fn request_transition(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(event): Json<OrderEvent>,
) -> Result<Json<TransitionOutcome>, AppError> {
    let outcome = state
        .coordinator
        .request_transition(&OrderId(id), event)
        .await?;
    Ok(Json(outcome))
}

async fn start_polling(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Option<Json<StartPollingRequest>>,
) -> Result<Json<PollingResponse>, AppError> {
    let order_id = OrderId(id);
    let payload = payload.map(|Json(payload)| payload).unwrap_or_default();
    let interval = payload
        .interval_ms
        .map(Duration::from_millis)
        .unwrap_or(state.default_poll_interval);

    let report_rx = state.coordinator.start_polling(&order_id, interval).await?;

    Ok(Json(PollingResponse {
        polling: report_rx.is_some(),
        report: report_rx.map(|rx| rx.borrow().clone()),
        order_id,
    }))
}

async fn polling_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PollingResponse>, AppError> {
    let order_id = OrderId(id);
    let report = state
        .coordinator
        .poller()
        .report(&order_id)
        .ok_or_else(|| AppError::NotFound(format!("no polling session for order {order_id}")))?;

    Ok(Json(PollingResponse {
        polling: state.coordinator.poller().is_active(&order_id),
        report: Some(report),
        order_id,
    }))
}

async fn stop_polling(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<StopPollingResponse> {
    let order_id = OrderId(id);
    let stopped = state.coordinator.poller().stop(&order_id).await;
    Json(StopPollingResponse { order_id, stopped })
}
