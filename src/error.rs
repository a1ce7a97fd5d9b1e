use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::pickup::PickupStatus;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("cannot {action} pickup {id} while it is {from}")]
    InvalidTransition {
        id: Uuid,
        from: PickupStatus,
        action: &'static str,
    },

    #[error("bin counts must be non-negative (delivered {delivered}, collected {collected})")]
    InvalidBinCount { delivered: i64, collected: i64 },

    #[error("invalid quantity {quantity} for product {product}")]
    InvalidQuantity { product: String, quantity: f64 },

    #[error("a signature is required to complete a pickup")]
    MissingSignature,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage unavailable: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Retrying the whole operation from scratch is safe for these.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Storage(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::MissingSignature => StatusCode::BAD_REQUEST,
            AppError::InvalidBinCount { .. } | AppError::InvalidQuantity { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::InvalidTransition { .. } => StatusCode::CONFLICT,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = Json(json!({
            "error": self.to_string(),
            "retryable": self.is_retryable(),
        }));

        (status, body).into_response()
    }
}
