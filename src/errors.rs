use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use thiserror::Error;
use tracing::error;

use crate::config::ConfigError;
use crate::store::StoreError;

/// Seconds a client should wait before retrying a transient failure.
const RETRY_AFTER_SECS: &str = "30";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Persistence error: {message}")]
    Persistence { message: String, retryable: bool },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

fn retry_after() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Retry-After", HeaderValue::from_static(RETRY_AFTER_SECS));
    headers
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        match self {
            AppError::NotFound(what) => (StatusCode::NOT_FOUND, format!("Not found: {}", what)).into_response(),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::Persistence { message, retryable: true } => {
                error!("Watchlist storage unavailable: {}", message);
                (StatusCode::SERVICE_UNAVAILABLE, retry_after(), "Watchlist storage temporarily unavailable")
                    .into_response()
            }
            AppError::Persistence { message, retryable: false } => {
                error!("Watchlist storage error: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, "Watchlist storage error").into_response()
            }
            AppError::Config(msg) | AppError::Internal(msg) => {
                error!("{}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        let retryable = value.is_retryable();
        AppError::Persistence { message: value.to_string(), retryable }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        AppError::Config(value.to_string())
    }
}
