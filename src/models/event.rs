use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::{OrderId, OrderStatus};
use crate::models::return_request::{ReturnId, ReturnStatus};

/// Lifecycle changes pushed to websocket subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    OrderTransitioned {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        at: DateTime<Utc>,
    },
    OrderCancelled {
        order_id: OrderId,
        reason: Option<String>,
        at: DateTime<Utc>,
    },
    ReturnTransitioned {
        return_id: ReturnId,
        from: ReturnStatus,
        to: ReturnStatus,
        at: DateTime<Utc>,
    },
    TrackingStarted {
        session_id: Uuid,
        order_id: OrderId,
    },
    TrackingStopped {
        session_id: Uuid,
        order_id: OrderId,
    },
    PollingStopped {
        order_id: OrderId,
    },
}
