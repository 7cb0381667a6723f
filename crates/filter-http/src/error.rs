//! Translation of [`lsd_core::Error`] (and this crate's own request-parsing
//! failures) into an HTTP status code and a `{"error": "..."}` JSON body.
//!
//! Handlers never match on `lsd_core::Error` themselves; they propagate it
//! with `?` and let this `IntoResponse` impl do the mapping, in one place,
//! matching the status table in the spec (§4.6, §7).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Errors this crate's handlers can fail with: either a core error, or a
/// request-parsing failure caught before the core is even called (a
/// malformed UUID, non-numeric query parameter, or bad gzip body).
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] lsd_core::Error),

    #[error("invalid request: {0}")]
    BadRequest(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Core(lsd_core::Error::NotFound) => StatusCode::NOT_FOUND,
            ApiError::Core(lsd_core::Error::Conflict(_)) => StatusCode::CONFLICT,
            ApiError::Core(lsd_core::Error::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Core(lsd_core::Error::Storage(err)) => {
                tracing::error!(%err, "storage error serving request");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Core(lsd_core::Error::Decode(err)) => {
                tracing::error!(%err, "decode error serving request");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };

        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}
