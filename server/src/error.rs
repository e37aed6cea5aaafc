use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tts_core::TtsError;

/// API Error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("Storage failed: {0}")]
    StorageFailed(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl From<TtsError> for ApiError {
    fn from(err: TtsError) -> Self {
        match err {
            TtsError::InvalidRequest(msg) => ApiError::InvalidInput(msg),
            TtsError::SynthesisFailure(msg) => ApiError::SynthesisFailed(msg),
            TtsError::StorageFailure(msg) => ApiError::StorageFailed(msg),
        }
    }
}

/// Error response structure
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::SynthesisFailed(_)
            | ApiError::StorageFailed(_)
            | ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // server-side details stay in the log
        let error_message = match self {
            ApiError::InvalidInput(msg) | ApiError::NotFound(msg) => msg,
            ApiError::SynthesisFailed(msg) => {
                tracing::error!(error = %msg, "synthesis error");
                "Speech synthesis failed".to_string()
            }
            ApiError::StorageFailed(msg) => {
                tracing::error!(error = %msg, "storage error");
                "Failed to store synthesized audio".to_string()
            }
            ApiError::InternalError(msg) => {
                tracing::error!(error = %msg, "internal error");
                "Internal server error".to_string()
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}
