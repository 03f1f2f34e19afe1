//! Rider-initiated order transitions.
//!
//! ```text
//! new      --accept-->          accepted
//! new      --reject(reason)-->  rejected   (terminal)
//! accepted --set_eta(min)-->    accepted
//! accepted --onway-->           onway
//! accepted --fail(reason)-->    failed     (terminal)
//! onway    --deliver-->         delivered  (terminal)
//! ```
//!
//! `cancelled` is imposed by the backend only and never requested here.

use serde::{Deserialize, Serialize};

use crate::backend::StatusUpdate;
use crate::engine::effect::Effect;
use crate::error::AppError;
use crate::models::order::{DeliveryOrder, OrderStatus};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Accept,
    Reject {
        #[serde(default)]
        reason: Option<String>,
    },
    SetEta {
        minutes: u32,
    },
    Onway,
    Fail {
        #[serde(default)]
        reason: Option<String>,
    },
    Deliver,
}

impl OrderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OrderEvent::Accept => "accept",
            OrderEvent::Reject { .. } => "reject",
            OrderEvent::SetEta { .. } => "set_eta",
            OrderEvent::Onway => "onway",
            OrderEvent::Fail { .. } => "fail",
            OrderEvent::Deliver => "deliver",
        }
    }
}

/// A validated transition, ready to be sent to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionPlan {
    pub from: OrderStatus,
    pub update: StatusUpdate,
    pub effects: Vec<Effect>,
}

impl TransitionPlan {
    pub fn target(&self) -> OrderStatus {
        self.update.status
    }
}

/// Validates `event` against the order's current status.
///
/// Terminal orders reject everything with `OrderTerminal`; an illegal pair
/// is `InvalidTransition`; a legal reject/fail with a blank reason is
/// `MissingReason`.
pub fn plan_transition(
    order: &DeliveryOrder,
    event: &OrderEvent,
) -> Result<TransitionPlan, AppError> {
    if order.is_terminal() {
        return Err(AppError::OrderTerminal {
            status: order.status,
        });
    }

    let order_id = order.id.clone();
    let update = |status, reason, eta_minutes| StatusUpdate {
        order_id: order_id.clone(),
        status,
        reason,
        eta_minutes,
    };

    let (status_update, effects) = match (order.status, event) {
        (OrderStatus::New, OrderEvent::Accept) => (
            update(OrderStatus::Accepted, None, None),
            vec![Effect::StartTracking {
                order_id: order_id.clone(),
            }],
        ),
        (OrderStatus::New, OrderEvent::Reject { reason }) => (
            update(OrderStatus::Rejected, Some(require_reason(event, reason)?), None),
            vec![
                Effect::StopTracking {
                    order_id: order_id.clone(),
                },
                Effect::LeaveDetail {
                    order_id: order_id.clone(),
                },
            ],
        ),
        (OrderStatus::Accepted, OrderEvent::SetEta { minutes }) => {
            if *minutes == 0 {
                return Err(AppError::BadRequest("eta must be at least one minute".to_string()));
            }
            (update(OrderStatus::Accepted, None, Some(*minutes)), Vec::new())
        }
        (OrderStatus::Accepted, OrderEvent::Onway) => (
            update(OrderStatus::Onway, None, None),
            vec![Effect::EnsureTracking {
                order_id: order_id.clone(),
            }],
        ),
        (OrderStatus::Accepted, OrderEvent::Fail { reason }) => (
            update(OrderStatus::Failed, Some(require_reason(event, reason)?), None),
            vec![
                Effect::StopTracking {
                    order_id: order_id.clone(),
                },
                Effect::LeaveDetail {
                    order_id: order_id.clone(),
                },
            ],
        ),
        (OrderStatus::Onway, OrderEvent::Deliver) => (
            update(OrderStatus::Delivered, None, None),
            vec![
                Effect::StopTracking {
                    order_id: order_id.clone(),
                },
                Effect::StopPolling {
                    order_id: order_id.clone(),
                },
                Effect::LeaveDetail {
                    order_id: order_id.clone(),
                },
            ],
        ),
        (from, event) => {
            return Err(AppError::InvalidTransition {
                from: from.to_string(),
                event: event.name().to_string(),
            });
        }
    };

    Ok(TransitionPlan {
        from: order.status,
        update: status_update,
        effects,
    })
}

fn require_reason(event: &OrderEvent, reason: &Option<String>) -> Result<String, AppError> {
    match reason.as_deref().map(str::trim) {
        Some(reason) if !reason.is_empty() => Ok(reason.to_string()),
        _ => Err(AppError::MissingReason {
            event: event.name().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{plan_transition, OrderEvent};
    use crate::engine::effect::Effect;
    use crate::error::AppError;
    use crate::models::order::{DeliveryOrder, OrderId, OrderStatus};

    const ALL_STATUSES: [OrderStatus; 7] = [
        OrderStatus::New,
        OrderStatus::Accepted,
        OrderStatus::Onway,
        OrderStatus::Delivered,
        OrderStatus::Failed,
        OrderStatus::Rejected,
        OrderStatus::Cancelled,
    ];

    fn all_events() -> Vec<OrderEvent> {
        vec![
            OrderEvent::Accept,
            OrderEvent::Reject {
                reason: Some("busy".to_string()),
            },
            OrderEvent::SetEta { minutes: 15 },
            OrderEvent::Onway,
            OrderEvent::Fail {
                reason: Some("customer unreachable".to_string()),
            },
            OrderEvent::Deliver,
        ]
    }

    fn order_in(status: OrderStatus) -> DeliveryOrder {
        let mut order = DeliveryOrder::new(OrderId::from("ord-1"));
        order.status = status;
        order
    }

    fn expected_target(status: OrderStatus, event: &OrderEvent) -> Option<OrderStatus> {
        match (status, event) {
            (OrderStatus::New, OrderEvent::Accept) => Some(OrderStatus::Accepted),
            (OrderStatus::New, OrderEvent::Reject { .. }) => Some(OrderStatus::Rejected),
            (OrderStatus::Accepted, OrderEvent::SetEta { .. }) => Some(OrderStatus::Accepted),
            (OrderStatus::Accepted, OrderEvent::Onway) => Some(OrderStatus::Onway),
            (OrderStatus::Accepted, OrderEvent::Fail { .. }) => Some(OrderStatus::Failed),
            (OrderStatus::Onway, OrderEvent::Deliver) => Some(OrderStatus::Delivered),
            _ => None,
        }
    }

    #[test]
    fn only_enumerated_transitions_succeed() {
        for status in ALL_STATUSES {
            for event in all_events() {
                let result = plan_transition(&order_in(status), &event);

                match (status.is_terminal(), expected_target(status, &event)) {
                    (true, _) => assert!(
                        matches!(result, Err(AppError::OrderTerminal { .. })),
                        "{status} + {} should be terminal",
                        event.name()
                    ),
                    (false, Some(target)) => {
                        assert_eq!(result.unwrap().target(), target);
                    }
                    (false, None) => assert!(
                        matches!(result, Err(AppError::InvalidTransition { .. })),
                        "{status} + {} should be invalid",
                        event.name()
                    ),
                }
            }
        }
    }

    #[test]
    fn reject_and_fail_require_non_empty_reason() {
        for reason in [None, Some(String::new()), Some("   ".to_string())] {
            let result = plan_transition(
                &order_in(OrderStatus::New),
                &OrderEvent::Reject {
                    reason: reason.clone(),
                },
            );
            assert!(matches!(result, Err(AppError::MissingReason { .. })));

            let result = plan_transition(
                &order_in(OrderStatus::Accepted),
                &OrderEvent::Fail { reason },
            );
            assert!(matches!(result, Err(AppError::MissingReason { .. })));
        }
    }

    #[test]
    fn reason_is_trimmed_and_forwarded() {
        let plan = plan_transition(
            &order_in(OrderStatus::New),
            &OrderEvent::Reject {
                reason: Some("  too far  ".to_string()),
            },
        )
        .unwrap();

        assert_eq!(plan.update.reason.as_deref(), Some("too far"));
    }

    #[test]
    fn accept_starts_tracking_and_deliver_stops_everything() {
        let accept = plan_transition(&order_in(OrderStatus::New), &OrderEvent::Accept).unwrap();
        assert_eq!(
            accept.effects,
            vec![Effect::StartTracking {
                order_id: OrderId::from("ord-1")
            }]
        );

        let deliver = plan_transition(&order_in(OrderStatus::Onway), &OrderEvent::Deliver).unwrap();
        assert!(deliver.effects.contains(&Effect::StopTracking {
            order_id: OrderId::from("ord-1")
        }));
        assert!(deliver.effects.contains(&Effect::StopPolling {
            order_id: OrderId::from("ord-1")
        }));
    }

    #[test]
    fn eta_is_a_self_loop_with_payload() {
        let plan = plan_transition(
            &order_in(OrderStatus::Accepted),
            &OrderEvent::SetEta { minutes: 12 },
        )
        .unwrap();

        assert_eq!(plan.target(), OrderStatus::Accepted);
        assert_eq!(plan.update.eta_minutes, Some(12));
        assert!(plan.effects.is_empty());

        let zero = plan_transition(
            &order_in(OrderStatus::Accepted),
            &OrderEvent::SetEta { minutes: 0 },
        );
        assert!(matches!(zero, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn events_decode_from_driver_json() {
        let event: OrderEvent =
            serde_json::from_str(r#"{"event":"reject","reason":"busy"}"#).unwrap();
        assert_eq!(
            event,
            OrderEvent::Reject {
                reason: Some("busy".to_string())
            }
        );

        let event: OrderEvent = serde_json::from_str(r#"{"event":"fail"}"#).unwrap();
        assert_eq!(event, OrderEvent::Fail { reason: None });

        let event: OrderEvent =
            serde_json::from_str(r#"{"event":"set_eta","minutes":20}"#).unwrap();
        assert_eq!(event, OrderEvent::SetEta { minutes: 20 });
    }
}
