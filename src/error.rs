//! Error handling

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::{debug, error, info};

/// Errors returned to HTTP callers.
#[derive(Debug)]
pub enum StorybookError {
    /// A required field was missing or invalid, the message goes back to the caller
    BadRequest(&'static str),
    /// When a requested file is not found
    NotFound(String),
    /// Something went wrong on our side; the first field is the public
    /// message, the second is only logged
    InternalServerError(&'static str, String),
}

impl StorybookError {
    /// Wraps an unexpected failure with the message shown to the caller.
    pub fn internal(message: &'static str, detail: impl Into<String>) -> Self {
        StorybookError::InternalServerError(message, detail.into())
    }
}

impl std::fmt::Display for StorybookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest(message) => write!(f, "Bad request: {message}"),
            Self::NotFound(path) => write!(f, "Not found: {path}"),
            Self::InternalServerError(message, detail) => write!(f, "{message}: {detail}"),
        }
    }
}

impl std::error::Error for StorybookError {}

impl From<std::io::Error> for StorybookError {
    fn from(err: std::io::Error) -> Self {
        StorybookError::internal("Internal server error", err.to_string())
    }
}

impl From<axum::http::Error> for StorybookError {
    fn from(err: axum::http::Error) -> Self {
        StorybookError::internal("Internal server error", err.to_string())
    }
}

impl IntoResponse for StorybookError {
    fn into_response(self) -> axum::response::Response {
        match self {
            StorybookError::BadRequest(message) => {
                info!("Bad request received: {message}");
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            StorybookError::NotFound(path) => {
                debug!("404 {path}");
                (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
            }
            StorybookError::InternalServerError(message, detail) => {
                error!("{message}: {detail}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": message })),
                )
                    .into_response()
            }
        }
    }
}
