use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::backend::BackendError;
use crate::models::order::OrderStatus;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("event {event} is not allowed from status {from}")]
    InvalidTransition { from: String, event: String },

    #[error("{event} requires a non-empty reason")]
    MissingReason { event: String },

    #[error("order is already {status}; no further transitions are accepted")]
    OrderTerminal { status: OrderStatus },

    #[error("a transition for {0} is already in flight")]
    TransitionInProgress(String),

    #[error("location permission denied (foreground: {foreground}, background: {background})")]
    PermissionDenied { foreground: bool, background: bool },

    #[error("network error: {0}")]
    Network(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::MissingReason { .. } => "missing_reason",
            AppError::OrderTerminal { .. } => "order_terminal",
            AppError::TransitionInProgress(_) => "in_progress",
            AppError::PermissionDenied { .. } => "permission_denied",
            AppError::Network(_) => "network",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::Internal(_) => "internal",
        }
    }

    /// Only connectivity failures are worth offering the rider a retry for.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Network(_))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidTransition { .. }
            | AppError::OrderTerminal { .. }
            | AppError::TransitionInProgress(_) => StatusCode::CONFLICT,
            AppError::MissingReason { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            AppError::Network(_) => StatusCode::BAD_GATEWAY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Network(msg) => AppError::Network(msg),
            BackendError::NotFound(msg) => AppError::NotFound(msg),
            BackendError::Rejected { status, message } => {
                AppError::BadRequest(format!("backend rejected request ({status}): {message}"))
            }
            BackendError::Decode(msg) => {
                AppError::Internal(format!("unexpected backend response: {msg}"))
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.kind(),
            "retryable": self.is_retryable(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    use super::AppError;
    use crate::backend::BackendError;

    #[test]
    fn backend_network_failure_is_retryable() {
        let err: AppError = BackendError::Network("connection reset".to_string()).into();
        assert!(err.is_retryable());
        assert_eq!(err.kind(), "network");
    }

    #[test]
    fn state_machine_errors_map_to_conflict() {
        let err = AppError::InvalidTransition {
            from: "new".to_string(),
            event: "deliver".to_string(),
        };
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);

        let err = AppError::MissingReason {
            event: "reject".to_string(),
        };
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
