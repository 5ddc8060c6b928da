// ============================
// crates/backend-lib/src/handlers/json.rs
// ============================
//! JSON body extractor that answers with the API error envelope.
use axum::extract::{rejection::JsonRejection, FromRequest, Request};
use axum::Json;
use serde::de::DeserializeOwned;

use crate::error::AppError;
use crate::validation::ValidationErrors;

/// Like `axum::Json`, but a body that cannot be decoded becomes
/// `AppError::Validation` keyed on the `body` field
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                tracing::debug!(error = %rejection.body_text(), "request body rejected");
                Err(rejection_to_error(&rejection).into())
            }
        }
    }
}

fn rejection_to_error(rejection: &JsonRejection) -> ValidationErrors {
    let message = match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            "The request body must be sent as application/json.".to_string()
        }
        JsonRejection::JsonSyntaxError(_) => "The request body is not valid JSON.".to_string(),
        JsonRejection::JsonDataError(_) => {
            "The request body does not match the expected fields.".to_string()
        }
        other => format!("The request body could not be read: {}", other.body_text()),
    };

    let mut errors = ValidationErrors::new();
    errors.add("body", message);
    errors
}
