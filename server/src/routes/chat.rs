//! The three streaming contracts in §6: OpenAI, Anthropic, and vendor
//! NDJSON all funnel through the same `Dispatcher::dispatch` call and
//! differ only in dialect, content-type, and how the inbound `X-Hijack`
//! header is read.

use std::time::Instant;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gateway_dispatch::DispatchRequest;
use gateway_types::ApiDialect;

use crate::error::ApiError;
use crate::state::AppState;

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn dispatch_one(state: &AppState, dialect: ApiDialect, headers: HeaderMap, body: serde_json::Value) -> Result<Response, ApiError> {
    let model = body.get("model").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let hijack_header = header_str(&headers, "x-hijack").map(str::to_string);
    let user_agent = header_str(&headers, "user-agent").map(str::to_string);

    let outcome = state
        .dispatcher
        .dispatch(DispatchRequest {
            model,
            dialect,
            body: &body,
            hijack_header: hijack_header.as_deref(),
            user_agent: user_agent.as_deref(),
            deadline: Instant::now() + state.request_timeout,
        })
        .await?;

    let content_type = match dialect {
        ApiDialect::Anthropic | ApiDialect::OpenAi => "text/event-stream",
        ApiDialect::Ndjson => "application/x-ndjson",
    };

    Ok((
        [(axum::http::header::CONTENT_TYPE, content_type)],
        outcome.frames.concat(),
    )
        .into_response())
}

/// `POST /v1/chat/completions` — OpenAI-compatible SSE.
pub async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<Response, ApiError> {
    dispatch_one(&state, ApiDialect::OpenAi, headers, body).await
}

/// `POST /antigravity/v1/messages` — Anthropic-native SSE.
pub async fn messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<Response, ApiError> {
    dispatch_one(&state, ApiDialect::Anthropic, headers, body).await
}

/// `POST /gateway/chat-stream` — vendor NDJSON.
pub async fn chat_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<Response, ApiError> {
    dispatch_one(&state, ApiDialect::Ndjson, headers, body).await
}
