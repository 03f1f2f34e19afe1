use serde::{Deserialize, Serialize};

use crate::models::order::OrderId;
use crate::models::return_request::ReturnId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Order,
    Return,
    Broadcast,
    #[serde(other)]
    Unknown,
}

/// Push payload as delivered by the notification service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationPayload {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub deep_link: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "route", rename_all = "snake_case")]
pub enum Route {
    OrderDetail { order_id: OrderId },
    /// Return notifications carry the return id in `order_id`.
    ReturnDetail { return_id: ReturnId },
    DeepLink { url: String },
    Home,
}

pub fn route_notification(payload: &NotificationPayload) -> Route {
    let id = non_blank(payload.order_id.as_deref());

    match payload.kind {
        NotificationKind::Order => id.map_or(Route::Home, |id| Route::OrderDetail {
            order_id: OrderId::from(id),
        }),
        NotificationKind::Return => id.map_or(Route::Home, |id| Route::ReturnDetail {
            return_id: ReturnId::from(id),
        }),
        NotificationKind::Broadcast => non_blank(payload.deep_link.as_deref())
            .map_or(Route::Home, |url| Route::DeepLink {
                url: url.to_string(),
            }),
        NotificationKind::Unknown => Route::Home,
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::{route_notification, NotificationPayload, Route};
    use crate::models::order::OrderId;
    use crate::models::return_request::ReturnId;

    fn payload(json: &str) -> NotificationPayload {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn order_and_return_open_their_detail() {
        assert_eq!(
            route_notification(&payload(r#"{"type":"order","order_id":"o-7"}"#)),
            Route::OrderDetail {
                order_id: OrderId::from("o-7")
            }
        );
        assert_eq!(
            route_notification(&payload(r#"{"type":"return","order_id":"r-3"}"#)),
            Route::ReturnDetail {
                return_id: ReturnId::from("r-3")
            }
        );
    }

    #[test]
    fn broadcast_follows_deep_link_or_goes_home() {
        assert_eq!(
            route_notification(&payload(
                r#"{"type":"broadcast","deep_link":"app://promotions/42"}"#
            )),
            Route::DeepLink {
                url: "app://promotions/42".to_string()
            }
        );
        assert_eq!(
            route_notification(&payload(r#"{"type":"broadcast"}"#)),
            Route::Home
        );
        assert_eq!(
            route_notification(&payload(r#"{"type":"broadcast","deep_link":"  "}"#)),
            Route::Home
        );
    }

    #[test]
    fn missing_id_and_unknown_types_fall_back_to_home() {
        assert_eq!(route_notification(&payload(r#"{"type":"order"}"#)), Route::Home);
        assert_eq!(
            route_notification(&payload(r#"{"type":"promo","order_id":"x"}"#)),
            Route::Home
        );
    }
}
