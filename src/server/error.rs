//! HTTP error mapping
//!
//! Every route answers failures with `{"error": <message>}` and a mapped
//! status. Domain errors carry their own status; anything unrecognized
//! becomes a 500.

use crate::error::RelayError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// A status code plus the client-facing message for the JSON error body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_IMPLEMENTED,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<RelayError>() {
            Some(RelayError::BadRequest(message)) => ApiError::bad_request(message.clone()),
            Some(RelayError::UnknownSession(id)) => {
                ApiError::not_found(format!("Unknown session: {id}"))
            }
            _ => ApiError::internal(err.to_string()),
        }
    }
}
