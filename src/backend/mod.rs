//! Rider-facing backend operations.
//!
//! The backend owns orders and returns; this crate only reads snapshots and
//! requests status changes through [`BackendApi`].

pub mod http;
pub mod memory;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::models::location::{GeoPoint, LiveLocation};
use crate::models::order::{DeliveryOrder, HistoryFilter, OrderId, OrderStatus};
use crate::models::return_request::{ReturnId, ReturnRequest, ReturnStatus};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
    /// Connectivity problem or server-side failure; safe to retry on user action.
    #[error("network error: {0}")]
    Network(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// Body of an order status update.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusUpdate {
    #[serde(skip)]
    pub order_id: OrderId,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_minutes: Option<u32>,
}

#[async_trait]
pub trait BackendApi: Send + Sync {
    /// Orders assigned to the rider that have not reached a terminal status.
    async fn fetch_active_orders(&self) -> Result<Vec<DeliveryOrder>, BackendError>;

    async fn fetch_order_history(
        &self,
        filter: HistoryFilter,
    ) -> Result<Vec<DeliveryOrder>, BackendError>;

    /// Applies a status change and returns the order as the backend now sees it.
    ///
    /// Re-sending the status the order already has must be a no-op.
    async fn update_order_status(
        &self,
        update: &StatusUpdate,
    ) -> Result<DeliveryOrder, BackendError>;

    async fn fetch_live_location(&self, order_id: &OrderId) -> Result<LiveLocation, BackendError>;

    /// The backend attaches the fix to whichever order is active for the rider.
    async fn report_location(&self, point: &GeoPoint) -> Result<(), BackendError>;

    async fn fetch_pending_returns(&self) -> Result<Vec<ReturnRequest>, BackendError>;

    async fn accept_return(&self, return_id: &ReturnId) -> Result<ReturnRequest, BackendError>;

    async fn update_return_status(
        &self,
        return_id: &ReturnId,
        status: ReturnStatus,
    ) -> Result<ReturnRequest, BackendError>;

    async fn register_push_token(&self, token: &str) -> Result<(), BackendError>;
}
