//! Side effects produced by lifecycle transitions.
//!
//! Transition planning is pure; the coordinator executes tracking and
//! polling effects itself and hands the UI ones back to the driver.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::order::{DeliveryOrder, OrderId, OrderStatus};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    StartTracking {
        order_id: OrderId,
    },
    /// Idempotent start: a session already bound to the order is kept.
    EnsureTracking {
        order_id: OrderId,
    },
    /// Stops tracking only if the active session is bound to this order.
    StopTracking {
        order_id: OrderId,
    },
    StopPolling {
        order_id: OrderId,
    },
    /// Navigate away from the order detail view.
    LeaveDetail {
        order_id: OrderId,
    },
    ShowCancelledBanner {
        order_id: OrderId,
        reason: Option<String>,
        cancelled_at: Option<DateTime<Utc>>,
    },
    DisableControls {
        order_id: OrderId,
    },
}

impl Effect {
    /// Effects the UI driver has to carry out.
    pub fn is_ui(&self) -> bool {
        matches!(
            self,
            Effect::LeaveDetail { .. }
                | Effect::ShowCancelledBanner { .. }
                | Effect::DisableControls { .. }
        )
    }
}

/// Effects for a terminal status that arrived from the backend rather than
/// from a local request.
pub fn observed_terminal_effects(order: &DeliveryOrder) -> Vec<Effect> {
    let order_id = order.id.clone();
    let mut effects = vec![
        Effect::StopTracking {
            order_id: order_id.clone(),
        },
        Effect::StopPolling {
            order_id: order_id.clone(),
        },
    ];

    if order.status == OrderStatus::Cancelled {
        effects.push(Effect::ShowCancelledBanner {
            order_id: order_id.clone(),
            reason: order.reason.clone(),
            cancelled_at: order.cancelled_at,
        });
    }

    effects.push(Effect::DisableControls { order_id });
    effects
}
