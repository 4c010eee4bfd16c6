//! Error handling for the GardenWatch monitor
//!
//! Most variants describe the outcome of one unit of work inside a batch and
//! never abort the batch. Only the surface errors reach the HTTP layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Unit-of-work outcomes
    #[error("No data available: {0}")]
    DataUnavailable(String),

    #[error("Upstream failure: {0}")]
    UpstreamFailure(String),

    #[error("Duplicate suppressed: {0}")]
    DuplicateSuppressed(String),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("Invalid subscription: {endpoint} (status {status})")]
    InvalidSubscription { endpoint: String, status: u16 },

    // Surface errors
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

impl AppError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code for responses and logs
    pub fn code(&self) -> &'static str {
        match self {
            AppError::DataUnavailable(_) => "DATA_UNAVAILABLE",
            AppError::UpstreamFailure(_) => "UPSTREAM_FAILURE",
            AppError::DuplicateSuppressed(_) => "DUPLICATE_SUPPRESSED",
            AppError::PersistenceFailure(_) => "PERSISTENCE_FAILURE",
            AppError::InvalidSubscription { .. } => "INVALID_SUBSCRIPTION",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::DataUnavailable(_) => StatusCode::NOT_FOUND,
            AppError::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
            AppError::DuplicateSuppressed(_) => StatusCode::CONFLICT,
            AppError::PersistenceFailure(_) | AppError::DatabaseError(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::InvalidSubscription { .. } => StatusCode::GONE,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    /// Always false; schedulers retry on `ok: false`
    pub ok: bool,
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            // Don't leak driver details to callers
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
            AppError::Validation { message, .. } => message.clone(),
            other => other.to_string(),
        };
        let field = match &self {
            AppError::Validation { field, .. } => Some(field.clone()),
            _ => None,
        };

        // Log the error for debugging
        tracing::error!("Error: {:?}", self);

        let body = ErrorResponse {
            ok: false,
            error: ErrorDetail {
                code: self.code().to_string(),
                message,
                field,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors
            .field_errors()
            .keys()
            .next()
            .map(|f| f.to_string())
            .unwrap_or_default();
        AppError::Validation {
            field,
            message: errors.to_string(),
        }
    }
}

/// Result type alias for handlers and services
pub type AppResult<T> = Result<T, AppError>;
