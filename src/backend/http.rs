//! `BackendApi` over the rider REST API.
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | GET    | `/rider/orders/active` | Active orders |
//! | GET    | `/rider/orders/history?status=` | Delivered / failed history |
//! | PATCH  | `/rider/orders/{id}/status` | Update order status |
//! | GET    | `/rider/orders/{id}/live-location` | Live location snapshot |
//! | POST   | `/rider/location` | Report rider position |
//! | GET    | `/rider/returns/pending` | Pending returns |
//! | POST   | `/rider/returns/{id}/accept` | Accept return |
//! | PATCH  | `/rider/returns/{id}/status` | Update return status |
//! | POST   | `/rider/push-token` | Register push token |

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use crate::backend::{BackendApi, BackendError, StatusUpdate};
use crate::models::location::{GeoPoint, LiveLocation};
use crate::models::order::{DeliveryOrder, HistoryFilter, OrderId};
use crate::models::return_request::{ReturnId, ReturnRequest, ReturnStatus};

#[derive(Debug, Clone)]
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(
        base_url: &str,
        token: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| BackendError::Rejected {
                    status: 0,
                    message: "backend token is not a valid header value".to_string(),
                })?;
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|err| BackendError::Network(format!("client init failed: {err}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, endpoint: &str, request: RequestBuilder) -> Result<Response, BackendError> {
        let response = request
            .send()
            .await
            .map_err(|err| BackendError::Network(format!("{endpoint}: {err}")))?;

        let status = response.status();
        debug!(endpoint, status = status.as_u16(), "backend responded");

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(endpoint, status, body))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<T, BackendError> {
        let response = self.send(endpoint, request).await?;
        response
            .json::<T>()
            .await
            .map_err(|err| BackendError::Decode(format!("{endpoint}: {err}")))
    }
}

fn classify_failure(endpoint: &str, status: StatusCode, body: String) -> BackendError {
    if status == StatusCode::NOT_FOUND {
        BackendError::NotFound(format!("{endpoint}: {body}"))
    } else if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        BackendError::Network(format!("{endpoint} returned {status}: {body}"))
    } else {
        BackendError::Rejected {
            status: status.as_u16(),
            message: body,
        }
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn fetch_active_orders(&self) -> Result<Vec<DeliveryOrder>, BackendError> {
        let request = self.http.get(self.url("/rider/orders/active"));
        self.send_json("GET /rider/orders/active", request).await
    }

    async fn fetch_order_history(
        &self,
        filter: HistoryFilter,
    ) -> Result<Vec<DeliveryOrder>, BackendError> {
        let request = self
            .http
            .get(self.url("/rider/orders/history"))
            .query(&[("status", filter.as_str())]);
        self.send_json("GET /rider/orders/history", request).await
    }

    async fn update_order_status(
        &self,
        update: &StatusUpdate,
    ) -> Result<DeliveryOrder, BackendError> {
        let request = self
            .http
            .patch(self.url(&format!("/rider/orders/{}/status", update.order_id)))
            .json(update);
        self.send_json("PATCH /rider/orders/{id}/status", request).await
    }

    async fn fetch_live_location(&self, order_id: &OrderId) -> Result<LiveLocation, BackendError> {
        let request = self
            .http
            .get(self.url(&format!("/rider/orders/{order_id}/live-location")));
        self.send_json("GET /rider/orders/{id}/live-location", request)
            .await
    }

    async fn report_location(&self, point: &GeoPoint) -> Result<(), BackendError> {
        let request = self.http.post(self.url("/rider/location")).json(point);
        self.send("POST /rider/location", request).await?;
        Ok(())
    }

    async fn fetch_pending_returns(&self) -> Result<Vec<ReturnRequest>, BackendError> {
        let request = self.http.get(self.url("/rider/returns/pending"));
        self.send_json("GET /rider/returns/pending", request).await
    }

    async fn accept_return(&self, return_id: &ReturnId) -> Result<ReturnRequest, BackendError> {
        let request = self
            .http
            .post(self.url(&format!("/rider/returns/{return_id}/accept")));
        self.send_json("POST /rider/returns/{id}/accept", request).await
    }

    async fn update_return_status(
        &self,
        return_id: &ReturnId,
        status: ReturnStatus,
    ) -> Result<ReturnRequest, BackendError> {
        let request = self
            .http
            .patch(self.url(&format!("/rider/returns/{return_id}/status")))
            .json(&json!({ "status": status }));
        self.send_json("PATCH /rider/returns/{id}/status", request).await
    }

    async fn register_push_token(&self, token: &str) -> Result<(), BackendError> {
        let request = self
            .http
            .post(self.url("/rider/push-token"))
            .json(&json!({ "token": token }));
        self.send("POST /rider/push-token", request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::classify_failure;
    use crate::backend::BackendError;

    #[test]
    fn server_errors_are_transient() {
        let err = classify_failure("GET /x", StatusCode::SERVICE_UNAVAILABLE, String::new());
        assert!(matches!(err, BackendError::Network(_)));
    }

    #[test]
    fn client_errors_are_rejections() {
        let err = classify_failure("PATCH /x", StatusCode::UNPROCESSABLE_ENTITY, "nope".into());
        assert_eq!(
            err,
            BackendError::Rejected {
                status: 422,
                message: "nope".to_string()
            }
        );
    }
}
