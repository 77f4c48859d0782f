use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::llm_client::AiError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Ai(#[from] AiError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Ai(AiError::RateLimited { .. }) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Ai(AiError::Rejected(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Ai(AiError::AuthInvalid(_) | AiError::ParseFailure(_)) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Ai(AiError::ModelUnavailable { .. } | AiError::Transient { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message) = match &self {
            AppError::Validation(msg) => ("VALIDATION_ERROR", msg.clone()),
            AppError::Ai(e) => {
                if status.is_client_error() {
                    tracing::warn!("AI error: {e}");
                } else {
                    tracing::error!("AI error: {e}");
                }
                (e.code(), e.to_string())
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
