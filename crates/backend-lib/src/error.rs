// crates/backend-lib/src/error.rs

//! Central error type + Axum integration.
use crate::validation::ValidationErrors;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use multiauth_common::{ErrorBody, ErrorDetail};
use std::time::Duration;
use thiserror::Error;

/// Application error types with error codes and context
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("Email already registered for this guard")]
    DuplicateEmail,

    #[error("Too many login attempts, retry in {}s", retry_after_secs(.retry_after))]
    Throttled { retry_after: Duration },

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Session expired or invalid")]
    Unauthenticated,

    #[error("Storage timed out after {0:?}")]
    StoreTimeout(Duration),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Whole seconds for a retry hint, rounded up so clients never retry early
fn retry_after_secs(d: &Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::DuplicateEmail => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Throttled { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::InvalidCredentials | AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::StoreTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VAL_001",
            AppError::DuplicateEmail => "ACCT_001",
            AppError::Unauthenticated => "AUTH_001",
            AppError::InvalidCredentials => "AUTH_002",
            AppError::Throttled { .. } => "AUTH_003",
            AppError::Storage(_) => "STORE_001",
            AppError::StoreTimeout(_) => "STORE_002",
            AppError::Internal(_) => "INT_001",
            AppError::Io(_) => "IO_001",
            AppError::Json(_) => "JSON_001",
        }
    }

    /// True for failures the caller may retry unchanged
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::StoreTimeout(_))
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            AppError::Validation(_) => "The given data was invalid".to_string(),
            AppError::DuplicateEmail => "The email has already been taken".to_string(),
            AppError::Throttled { retry_after } => format!(
                "Too many login attempts, please try again in {} seconds",
                retry_after_secs(retry_after)
            ),
            AppError::InvalidCredentials => "These credentials do not match our records".to_string(),
            AppError::Unauthenticated => "Not authenticated".to_string(),
            AppError::StoreTimeout(_) => "Service temporarily unavailable".to_string(),
            AppError::Storage(_) | AppError::Io(_) => "Internal server error".to_string(),
            AppError::Internal(_) => "An internal server error occurred".to_string(),
            AppError::Json(_) => "Invalid request format".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.error_code(), "request failed");
        }

        // Use detailed messages in development, sanitized in production
        let message = if cfg!(debug_assertions) {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        let fields = match &self {
            AppError::Validation(errors) => Some(errors.fields().clone()),
            _ => None,
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message,
                fields,
            },
        };

        let mut response = (status, axum::Json(body)).into_response();
        if let AppError::Throttled { retry_after } = &self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs(retry_after).to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(e: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("background task failed: {e}"))
    }
}
