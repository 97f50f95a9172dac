use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use validator::ValidationErrors;

use braid_persist::PersistError;

/// Gate-level request errors. Streaming-phase failures never reach the HTTP
/// caller; they are logged by the relay and only observable through the
/// eventual message state.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthenticated request.")]
    Unauthenticated,

    #[error("Invalid request body.")]
    Validation(ValidationErrors),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Monthly message limit reached.")]
    QuotaExceeded,

    #[error("No response body.")]
    Upstream(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Storage error")]
    Persist(#[from] PersistError),

    #[error("Internal server error.")]
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthenticated => error_response(StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::Validation(errors) => {
                let body = Json(json!({
                    "success": false,
                    "message": "Invalid request body.",
                    "errors": errors,
                }));
                (StatusCode::BAD_REQUEST, body).into_response()
            }
            ApiError::NotFound(_)
            | ApiError::Forbidden(_)
            | ApiError::QuotaExceeded
            | ApiError::BadRequest(_) => error_response(StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Upstream(ref detail) => {
                tracing::error!("Upstream error: {}", detail);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            ApiError::Persist(ref e) => {
                tracing::error!("Persistence error: {}", e);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "Storage error.".to_string())
            }
            ApiError::Internal => {
                error_response(StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        }
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    let body = Json(json!({
        "success": false,
        "message": message,
    }));
    (status, body).into_response()
}

pub type ApiResult<T> = Result<T, ApiError>;
