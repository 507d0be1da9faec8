use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use wingdesk_core::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    AuthenticationError(String),
    #[error("{0}")]
    AuthorizationError(String),
    #[error("{0}")]
    ValidationError(String),
    #[error(transparent)]
    Domain(#[from] CoreError),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::AuthenticationError(_) => (StatusCode::UNAUTHORIZED, "authentication"),
            AppError::AuthorizationError(_) => (StatusCode::FORBIDDEN, "authorization"),
            AppError::ValidationError(_) => (StatusCode::BAD_REQUEST, "validation"),
            AppError::Domain(err) => {
                let status = match err {
                    CoreError::Validation(_) => StatusCode::BAD_REQUEST,
                    CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
                    CoreError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
                    CoreError::Conflict(_)
                    | CoreError::Inventory(_)
                    | CoreError::Quota(_)
                    | CoreError::State(_) => StatusCode::CONFLICT,
                    CoreError::Persistence { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.kind())
            }
            AppError::Anyhow(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            // Persistence detail was logged where it was raised.
            if let AppError::Anyhow(err) = &self {
                tracing::error!("Internal Server Error: {:#}", err);
            }
            "operation failed".to_string()
        } else {
            if status != StatusCode::UNAUTHORIZED && status != StatusCode::FORBIDDEN {
                tracing::warn!(kind, "Request rejected: {}", self);
            }
            self.to_string()
        };

        let body = Json(json!({
            "error": message,
            "kind": kind,
        }));

        (status, body).into_response()
    }
}
