//! API-wide error type: maps `krai_core::error::Error` (and request-shape
//! problems the engine never sees) onto the status codes the HTTP surface
//! documents.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error(transparent)]
    Engine(#[from] krai_core::error::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            ApiError::Engine(e) => (engine_status(e), e.to_string()),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

/// `krai_core::error::Error` variants that can reach the API boundary map to
/// the status code their meaning implies; everything else is a 500.
fn engine_status(error: &krai_core::error::Error) -> StatusCode {
    use krai_core::error::Error;
    match error {
        Error::MissingInput(_) => StatusCode::NOT_FOUND,
        Error::InvalidInput(_) | Error::ContractViolation(_) => StatusCode::BAD_REQUEST,
        Error::DatabaseUnavailable(_) | Error::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
