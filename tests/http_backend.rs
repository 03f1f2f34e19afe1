use std::time::Duration;

use rider_lifecycle::backend::http::HttpBackend;
use rider_lifecycle::backend::{BackendApi, BackendError, StatusUpdate};
use rider_lifecycle::models::location::GeoPoint;
use rider_lifecycle::models::order::{HistoryFilter, OrderId, OrderStatus};
use rider_lifecycle::models::return_request::{ReturnId, ReturnStatus};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend(server: &MockServer) -> HttpBackend {
    HttpBackend::new(&server.uri(), Some("secret"), Duration::from_secs(2)).unwrap()
}

fn order_json(id: &str, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "status": status,
        "updated_at": "2026-03-01T10:00:00Z"
    })
}

#[tokio::test]
async fn active_orders_are_fetched_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rider/orders/active"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([order_json("ord-1", "new"), order_json("ord-2", "enroute")])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let orders = backend(&server).fetch_active_orders().await.unwrap();

    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].status, OrderStatus::New);
    assert_eq!(orders[1].status, OrderStatus::Onway);
}

#[tokio::test]
async fn history_passes_status_filter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rider/orders/history"))
        .and(query_param("status", "delivered"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([order_json("ord-1", "delivered")])))
        .mount(&server)
        .await;

    let orders = backend(&server)
        .fetch_order_history(HistoryFilter::Delivered)
        .await
        .unwrap();

    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Delivered);
}

#[tokio::test]
async fn status_update_sends_reason_and_returns_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/rider/orders/ord-1/status"))
        .and(body_json(json!({ "status": "rejected", "reason": "too far" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "ord-1",
            "status": "rejected",
            "reason": "too far",
            "updated_at": "2026-03-01T10:05:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let update = StatusUpdate {
        order_id: OrderId::from("ord-1"),
        status: OrderStatus::Rejected,
        reason: Some("too far".to_string()),
        eta_minutes: None,
    };
    let order = backend(&server).update_order_status(&update).await.unwrap();

    assert_eq!(order.status, OrderStatus::Rejected);
    assert_eq!(order.reason.as_deref(), Some("too far"));
}

#[tokio::test]
async fn missing_order_maps_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rider/orders/ghost/live-location"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such order"))
        .mount(&server)
        .await;

    let err = backend(&server)
        .fetch_live_location(&OrderId::from("ghost"))
        .await
        .unwrap_err();

    assert!(matches!(err, BackendError::NotFound(_)));
}

#[tokio::test]
async fn server_errors_map_to_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rider/location"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = backend(&server)
        .report_location(&GeoPoint {
            lat: 52.52,
            lng: 13.405,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, BackendError::Network(_)));
}

#[tokio::test]
async fn client_errors_map_to_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rider/returns/ret-1/accept"))
        .respond_with(ResponseTemplate::new(409).set_body_string("already accepted"))
        .mount(&server)
        .await;

    let err = backend(&server)
        .accept_return(&ReturnId::from("ret-1"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        BackendError::Rejected {
            status: 409,
            message: "already accepted".to_string()
        }
    );
}

#[tokio::test]
async fn malformed_body_maps_to_decode() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rider/returns/pending"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = backend(&server).fetch_pending_returns().await.unwrap_err();

    assert!(matches!(err, BackendError::Decode(_)));
}

#[tokio::test]
async fn return_status_update_uses_wire_name() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/rider/returns/ret-1/status"))
        .and(body_json(json!({ "status": "picked_up" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "ret-1",
            "order_id": "ord-1",
            "status": "picked_up",
            "reason": "wrong size",
            "updated_at": "2026-03-01T11:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = backend(&server)
        .update_return_status(&ReturnId::from("ret-1"), ReturnStatus::PickedUp)
        .await
        .unwrap();

    assert_eq!(request.status, ReturnStatus::PickedUp);
}

#[tokio::test]
async fn unreachable_backend_is_a_network_error() {
    let backend = HttpBackend::new("http://127.0.0.1:9", None, Duration::from_millis(500)).unwrap();

    let err = backend.register_push_token("tok").await.unwrap_err();

    assert!(matches!(err, BackendError::Network(_)));
}
