//! API error handling
//!
//! Author: hephaex@gmail.com

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use snapseek_core::SnapError;
use utoipa::ToSchema;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    #[schema(example = "BAD_REQUEST")]
    pub code: String,
    /// Human-readable message
    #[schema(example = "No search query provided")]
    pub message: String,
    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new("NOT_FOUND", format!("{resource} not found"))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn internal_error() -> Self {
        Self::new("INTERNAL_ERROR", "Internal server error")
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    /// Catalog or model service failed or timed out
    Upstream(String),
    Captioning(String),
    /// Feature not configured on this deployment
    NotImplemented(String),
    Internal(String),
    Database(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ApiError::not_found(&msg)),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ApiError::bad_request(msg)),
            AppError::Upstream(msg) => (
                StatusCode::BAD_GATEWAY,
                ApiError::new("UPSTREAM_UNAVAILABLE", "Upstream service unavailable")
                    .with_details(msg),
            ),
            AppError::Captioning(msg) => (
                StatusCode::BAD_GATEWAY,
                ApiError::new("CAPTIONING_FAILED", "Caption generation failed").with_details(msg),
            ),
            AppError::NotImplemented(msg) => (
                StatusCode::NOT_IMPLEMENTED,
                ApiError::new("NOT_IMPLEMENTED", msg),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::internal_error().with_details(msg),
            ),
            AppError::Database(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::new("DATABASE_ERROR", "Database operation failed").with_details(msg),
            ),
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), code = %error.code, details = ?error.details, "request failed");
        }

        (status, Json(error)).into_response()
    }
}

impl From<SnapError> for AppError {
    fn from(err: SnapError) -> Self {
        match err {
            SnapError::Validation(msg) => AppError::BadRequest(msg),
            SnapError::NotFound(msg) => AppError::NotFound(msg),
            SnapError::UpstreamUnavailable(msg) => AppError::Upstream(msg),
            SnapError::Captioning(msg) => AppError::Captioning(msg),
            SnapError::Unsupported(msg) => AppError::NotImplemented(msg),
            SnapError::Database(msg) => AppError::Database(msg),
            SnapError::Config(msg) => AppError::Internal(format!("Configuration error: {msg}")),
            SnapError::Other(err) => AppError::Internal(err.to_string()),
        }
    }
}
