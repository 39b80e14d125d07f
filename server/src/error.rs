//! Maps `DispatchError` (and the errors it wraps) onto the HTTP error
//! shapes in §7, at the one boundary that's allowed to flatten a typed
//! error into an opaque response.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use gateway_dispatch::DispatchError;
use serde_json::json;

pub struct ApiError {
    status: StatusCode,
    body: serde_json::Value,
    retry_after_secs: Option<u64>,
}

impl ApiError {
    fn new(status: StatusCode, error_type: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "type": "error", "error": { "type": error_type, "message": message.into() } }),
            retry_after_secs: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        if let Some(secs) = self.retry_after_secs
            && let Ok(value) = HeaderValue::from_str(&secs.to_string())
        {
            response.headers_mut().insert("retry-after", value);
        }
        response
    }
}

impl From<DispatchError> for ApiError {
    /// §7's error-kind table, as HTTP status + retry-after where applicable.
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Normalize(inner) => {
                Self::new(StatusCode::BAD_REQUEST, "malformed_tool_chain", inner.to_string())
            }
            DispatchError::Translate(inner) => {
                tracing::error!(error = %inner, "protocol translation failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
            }
            DispatchError::NoCredentialAvailable { retry_after_secs } => {
                let mut err = Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "no_credential_available",
                    format!("no credential will be eligible for {retry_after_secs}s"),
                );
                err.retry_after_secs = Some(retry_after_secs);
                err
            }
            DispatchError::Upstream(msg) => Self::new(StatusCode::BAD_GATEWAY, "upstream_error", msg),
            DispatchError::AttemptsExhausted { attempts, last } => {
                tracing::warn!(attempts, last, "dispatch exhausted all attempts");
                Self::new(StatusCode::BAD_GATEWAY, "upstream_error", last)
            }
        }
    }
}
