use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::location::GeoPoint;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrderId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    Accepted,
    #[serde(alias = "enroute", alias = "on_way")]
    Onway,
    Delivered,
    Failed,
    Rejected,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered
                | OrderStatus::Failed
                | OrderStatus::Rejected
                | OrderStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::Accepted => "accepted",
            OrderStatus::Onway => "onway",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Failed => "failed",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliverySpeed {
    #[default]
    Normal,
    Fast,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub product_id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryOrder {
    pub id: OrderId,
    pub status: OrderStatus,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub eta_minutes: Option<u32>,
    #[serde(default)]
    pub delivery_speed: DeliverySpeed,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub customer_location: Option<GeoPoint>,
    #[serde(default)]
    pub shop_location: Option<GeoPoint>,
    #[serde(default)]
    pub rider_location: Option<GeoPoint>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryOrder {
    /// A freshly offered order, as the rider first observes it.
    pub fn new(id: OrderId) -> Self {
        Self {
            id,
            status: OrderStatus::New,
            reason: None,
            eta_minutes: None,
            delivery_speed: DeliverySpeed::Normal,
            items: Vec::new(),
            customer_location: None,
            shop_location: None,
            rider_location: None,
            cancelled_at: None,
            updated_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HistoryFilter {
    Delivered,
    Failed,
}

impl HistoryFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            HistoryFilter::Delivered => "delivered",
            HistoryFilter::Failed => "failed",
        }
    }

    pub fn matches(self, status: OrderStatus) -> bool {
        match self {
            HistoryFilter::Delivered => status == OrderStatus::Delivered,
            HistoryFilter::Failed => status == OrderStatus::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DeliveryOrder, OrderStatus};

    #[test]
    fn enroute_is_accepted_as_onway() {
        let status: OrderStatus = serde_json::from_str("\"enroute\"").unwrap();
        assert_eq!(status, OrderStatus::Onway);

        let status: OrderStatus = serde_json::from_str("\"on_way\"").unwrap();
        assert_eq!(status, OrderStatus::Onway);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!OrderStatus::New.is_terminal());
        assert!(!OrderStatus::Accepted.is_terminal());
        assert!(!OrderStatus::Onway.is_terminal());
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
    }

    #[test]
    fn sparse_backend_payload_decodes_with_defaults() {
        let order: DeliveryOrder = serde_json::from_str(
            r#"{"id":"ord-9","status":"new","updated_at":"2026-01-02T03:04:05Z"}"#,
        )
        .unwrap();

        assert_eq!(order.id.0, "ord-9");
        assert!(order.items.is_empty());
        assert!(order.rider_location.is_none());
    }
}
