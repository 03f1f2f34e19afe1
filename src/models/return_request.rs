use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::order::OrderId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReturnId(pub String);

impl fmt::Display for ReturnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ReturnId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    Pending,
    Accepted,
    PickedUp,
    #[serde(alias = "delivered_to_shop")]
    DeliveredBack,
    Completed,
    Refunded,
}

impl ReturnStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ReturnStatus::DeliveredBack | ReturnStatus::Completed | ReturnStatus::Refunded
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReturnStatus::Pending => "pending",
            ReturnStatus::Accepted => "accepted",
            ReturnStatus::PickedUp => "picked_up",
            ReturnStatus::DeliveredBack => "delivered_back",
            ReturnStatus::Completed => "completed",
            ReturnStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for ReturnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReturnRequest {
    pub id: ReturnId,
    pub order_id: OrderId,
    pub status: ReturnStatus,
    #[serde(default)]
    pub reason: String,
    pub updated_at: DateTime<Utc>,
}

impl ReturnRequest {
    pub fn new(id: ReturnId, order_id: OrderId, reason: impl Into<String>) -> Self {
        Self {
            id,
            order_id,
            status: ReturnStatus::Pending,
            reason: reason.into(),
            updated_at: Utc::now(),
        }
    }
}
