//! Server-specific error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::{api::response::ErrorResponse, store::StoreError};

/// Result type alias for HTTP handlers
pub type AppResult<T> = std::result::Result<T, AppError>;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(String),

    /// Metadata was written but the job never reached the queue.
    #[error("File {file_id} was stored but could not be scheduled for processing")]
    Unscheduled { file_id: Uuid },
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::NotFound(message) => {
                (StatusCode::NOT_FOUND, ErrorResponse::new("NOT_FOUND", message.clone()))
            },
            AppError::Validation(message) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("VALIDATION_ERROR", message.clone()),
            ),
            AppError::Store(e) => {
                tracing::error!("Store error: {:?}", e);
                let status = if e.is_unavailable() {
                    StatusCode::SERVICE_UNAVAILABLE
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                (status, ErrorResponse::new("STORE_ERROR", "A storage error occurred"))
            },
            AppError::Internal(message) => {
                tracing::error!("Internal error: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("INTERNAL_ERROR", message.clone()),
                )
            },
            AppError::Unscheduled { file_id } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::with_details(
                    "ENQUEUE_FAILED",
                    self.to_string(),
                    json!({ "fileId": file_id }),
                ),
            ),
        };

        (status, Json(body)).into_response()
    }
}
