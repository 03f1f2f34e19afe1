//! Return-request lifecycle, independent of the order it came from.
//!
//! ```text
//! pending          --accept-->          accepted
//! pending|accepted --mark_picked_up-->  picked_up   (implicit accept first when pending)
//! picked_up        --mark_returned-->   delivered_back
//! ```

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::return_request::ReturnStatus;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReturnEvent {
    Accept,
    MarkPickedUp,
    MarkReturned,
}

impl ReturnEvent {
    pub fn name(self) -> &'static str {
        match self {
            ReturnEvent::Accept => "accept",
            ReturnEvent::MarkPickedUp => "mark_picked_up",
            ReturnEvent::MarkReturned => "mark_returned",
        }
    }
}

/// One backend call in a return transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnStep {
    /// Accept; when `tolerate_failure` is set an error (already accepted) is ignored.
    Accept { tolerate_failure: bool },
    SetStatus(ReturnStatus),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnPlan {
    pub from: ReturnStatus,
    pub target: ReturnStatus,
    pub steps: Vec<ReturnStep>,
}

pub fn plan_return(status: ReturnStatus, event: ReturnEvent) -> Result<ReturnPlan, AppError> {
    let (target, steps) = match (status, event) {
        (ReturnStatus::Pending, ReturnEvent::Accept) => (
            ReturnStatus::Accepted,
            vec![ReturnStep::Accept {
                tolerate_failure: false,
            }],
        ),
        (ReturnStatus::Pending, ReturnEvent::MarkPickedUp) => (
            ReturnStatus::PickedUp,
            vec![
                ReturnStep::Accept {
                    tolerate_failure: true,
                },
                ReturnStep::SetStatus(ReturnStatus::PickedUp),
            ],
        ),
        (ReturnStatus::Accepted, ReturnEvent::MarkPickedUp) => (
            ReturnStatus::PickedUp,
            vec![ReturnStep::SetStatus(ReturnStatus::PickedUp)],
        ),
        (ReturnStatus::PickedUp, ReturnEvent::MarkReturned) => (
            ReturnStatus::DeliveredBack,
            vec![ReturnStep::SetStatus(ReturnStatus::DeliveredBack)],
        ),
        (from, event) => {
            return Err(AppError::InvalidTransition {
                from: from.to_string(),
                event: event.name().to_string(),
            });
        }
    };

    Ok(ReturnPlan {
        from: status,
        target,
        steps,
    })
}

#[cfg(test)]
mod tests {
    use super::{plan_return, ReturnEvent, ReturnStep};
    use crate::error::AppError;
    use crate::models::return_request::ReturnStatus;

    #[test]
    fn pickup_from_pending_accepts_first_tolerantly() {
        let plan = plan_return(ReturnStatus::Pending, ReturnEvent::MarkPickedUp).unwrap();
        assert_eq!(plan.target, ReturnStatus::PickedUp);
        assert_eq!(
            plan.steps,
            vec![
                ReturnStep::Accept {
                    tolerate_failure: true
                },
                ReturnStep::SetStatus(ReturnStatus::PickedUp),
            ]
        );
    }

    #[test]
    fn pickup_from_accepted_skips_accept() {
        let plan = plan_return(ReturnStatus::Accepted, ReturnEvent::MarkPickedUp).unwrap();
        assert_eq!(plan.steps, vec![ReturnStep::SetStatus(ReturnStatus::PickedUp)]);
    }

    #[test]
    fn returned_requires_picked_up() {
        for status in [ReturnStatus::Pending, ReturnStatus::Accepted] {
            assert!(matches!(
                plan_return(status, ReturnEvent::MarkReturned),
                Err(AppError::InvalidTransition { .. })
            ));
        }

        let plan = plan_return(ReturnStatus::PickedUp, ReturnEvent::MarkReturned).unwrap();
        assert_eq!(plan.target, ReturnStatus::DeliveredBack);
    }

    #[test]
    fn finished_returns_reject_every_event() {
        for status in [
            ReturnStatus::DeliveredBack,
            ReturnStatus::Completed,
            ReturnStatus::Refunded,
        ] {
            for event in [
                ReturnEvent::Accept,
                ReturnEvent::MarkPickedUp,
                ReturnEvent::MarkReturned,
            ] {
                assert!(matches!(
                    plan_return(status, event),
                    Err(AppError::InvalidTransition { .. })
                ));
            }
        }
    }

    #[test]
    fn accept_only_from_pending() {
        assert!(plan_return(ReturnStatus::Pending, ReturnEvent::Accept).is_ok());
        assert!(plan_return(ReturnStatus::Accepted, ReturnEvent::Accept).is_err());
    }
}
