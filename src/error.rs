use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// HTTP-boundary error taxonomy. Internal errors (`JobStoreError`,
/// `GenerationError`, ...) convert into one of these at the handler layer —
/// they are never surfaced to an HTTP caller directly, and never surfaced to
/// a worker's retry loop at all (a worker's failures become `JobError`s
/// recorded on the job, not `AppError`s).
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not authorized to access this resource")]
    Authorization,
    #[error("Not found")]
    NotFound,
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Gone: {0}")]
    Gone(String),
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Internal server error")]
    Internal,
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Self::Conflict(reason) = &self {
            tracing::debug!(reason = %reason, "conflict");
            return (StatusCode::CONFLICT, Json(json!({ "reason": reason }))).into_response();
        }

        let (status, message) = match self {
            Self::Validation(msg) => {
                tracing::debug!(message = %msg, "validation error");
                (StatusCode::BAD_REQUEST, msg)
            }
            Self::Authorization => {
                tracing::debug!("authorization denied");
                (StatusCode::FORBIDDEN, "Not authorized".to_string())
            }
            Self::NotFound => {
                tracing::debug!("resource not found");
                (StatusCode::NOT_FOUND, "Not found".to_string())
            }
            Self::Conflict(_) => unreachable!("handled above"),
            Self::Gone(msg) => {
                tracing::debug!(message = %msg, "resource gone");
                (StatusCode::GONE, msg)
            }
            Self::QuotaExceeded(msg) => {
                tracing::warn!(message = %msg, "quota exceeded");
                (StatusCode::TOO_MANY_REQUESTS, msg)
            }
            Self::Database(e) => {
                tracing::error!(error = %e, "database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            Self::Internal => {
                tracing::error!("internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}
