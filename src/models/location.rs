use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::order::{OrderId, OrderStatus};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Consolidated position snapshot for one order as the backend sees it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiveLocation {
    pub order_id: OrderId,
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub shop: Option<GeoPoint>,
    #[serde(default)]
    pub rider: Option<GeoPoint>,
    #[serde(default)]
    pub customer: Option<GeoPoint>,
    /// Set by the backend once the order was cancelled or failed.
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
}
