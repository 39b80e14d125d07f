//! `GET /api/credentials/backoff-status?password=…`: a read-only admin
//! view of `CredentialPool::snapshot()`, gated by a constant-time password
//! check against `GatewayConfig::admin_password`.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::state::AppState;

#[derive(Deserialize)]
pub struct BackoffStatusQuery {
    password: Option<String>,
}

/// Compares in time proportional to `expected`'s length regardless of
/// where `provided` first diverges, so repeated probing can't binary-search
/// the admin password one byte at a time.
fn constant_time_eq(expected: &str, provided: &str) -> bool {
    let expected = expected.as_bytes();
    let provided = provided.as_bytes();
    if expected.len() != provided.len() {
        return false;
    }
    let mut diff = 0u8;
    for (a, b) in expected.iter().zip(provided.iter()) {
        diff |= a ^ b;
    }
    diff == 0
}

pub async fn backoff_status(State(state): State<AppState>, Query(query): Query<BackoffStatusQuery>) -> Response {
    let authorized = match (&state.admin_password, &query.password) {
        (Some(expected), Some(provided)) => constant_time_eq(expected, provided),
        (None, _) => true,
        (Some(_), None) => false,
    };

    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    Json(state.credentials.snapshot()).into_response()
}
