//! The `reqwest`-backed `UpstreamClient` (§1's thin transport layer).
//!
//! Grounded on `providers/src/retry.rs`'s status-code classification
//! (408/409/429/5xx retryable) and on the Antigravity/Gemini CLI proxy
//! shape used across the pack's `other_examples/` proxy handlers: a bearer
//! token per credential, `POST .../streamGenerateContent?alt=sse`, and an
//! SSE body split on blank-line-terminated `data:` frames.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use gateway_dispatch::{UpstreamCallError, UpstreamClient, UpstreamStream};
use reqwest::{Client, StatusCode};

const ANTIGRAVITY_ENDPOINT: &str =
    "https://cloudcode-pa.googleapis.com/v1internal:streamGenerateContent?alt=sse";

/// Resolves a credential id (as handed out by `gateway_credentials::CredentialPool`)
/// to the bearer token the real upstream call needs. The pool only tracks
/// cooldown bookkeeping, not secrets, so token material is held here.
pub struct TokenResolver {
    tokens: HashMap<String, String>,
}

impl TokenResolver {
    #[must_use]
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }

    fn resolve(&self, credential_id: &str) -> Result<&str, UpstreamCallError> {
        self.tokens
            .get(credential_id)
            .map(String::as_str)
            .ok_or_else(|| UpstreamCallError::NonRetryable(format!("no token configured for credential {credential_id}")))
    }
}

pub struct ReqwestUpstreamClient {
    http: Client,
    tokens: TokenResolver,
}

impl ReqwestUpstreamClient {
    #[must_use]
    pub fn new(http: Client, tokens: TokenResolver) -> Self {
        Self { http, tokens }
    }

    fn classify_status(status: StatusCode) -> UpstreamCallError {
        if status == StatusCode::TOO_MANY_REQUESTS {
            UpstreamCallError::RateLimited
        } else if should_retry_status(status) {
            UpstreamCallError::Recoverable(format!("upstream returned {status}"))
        } else {
            UpstreamCallError::NonRetryable(format!("upstream returned {status}"))
        }
    }
}

impl UpstreamClient for ReqwestUpstreamClient {
    fn call<'a>(
        &'a self,
        credential_id: &'a str,
        model: &'a str,
        body: &'a serde_json::Value,
    ) -> futures_util::future::BoxFuture<'a, Result<UpstreamStream, UpstreamCallError>> {
        Box::pin(async move {
            let token = self.tokens.resolve(credential_id)?;
            let payload = serde_json::json!({ "model": model, "request": body });

            let response = self
                .http
                .post(ANTIGRAVITY_ENDPOINT)
                .bearer_auth(token)
                .json(&payload)
                .send()
                .await
                .map_err(|err| UpstreamCallError::Recoverable(err.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(Self::classify_status(status));
            }

            let byte_stream = response.bytes_stream();
            let stream: UpstreamStream = Box::pin(sse_events(byte_stream));
            Ok(stream)
        })
    }
}

/// Splits a byte stream on blank-line-terminated `data:` SSE frames and
/// parses each payload as JSON, matching the upstream contract in §6
/// ("upstream returns an SSE stream of events in Anthropic-native or a
/// near-equivalent dialect").
fn sse_events(
    byte_stream: impl futures_util::Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
) -> impl futures_util::Stream<Item = Result<serde_json::Value, UpstreamCallError>> + Send + 'static {
    let mut buffer = String::new();
    byte_stream
        .map(|chunk| chunk.map_err(|err| UpstreamCallError::Recoverable(err.to_string())))
        .flat_map(move |chunk| {
            let frames = match chunk {
                Ok(bytes) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));
                    drain_complete_frames(&mut buffer)
                }
                Err(err) => vec![Err(err)],
            };
            stream::iter(frames)
        })
}

fn drain_complete_frames(buffer: &mut String) -> Vec<Result<serde_json::Value, UpstreamCallError>> {
    let mut out = Vec::new();
    while let Some(boundary) = buffer.find("\n\n") {
        let frame: String = buffer.drain(..boundary + 2).collect();
        for line in frame.lines() {
            let Some(data) = line.strip_prefix("data:") else { continue };
            let data = data.trim();
            if data.is_empty() || data == "[DONE]" {
                continue;
            }
            match serde_json::from_str::<serde_json::Value>(data) {
                Ok(value) => out.push(Ok(value)),
                Err(err) => out.push(Err(UpstreamCallError::NonRetryable(format!("malformed upstream SSE frame: {err}")))),
            }
        }
    }
    out
}

/// Retryable-status classification (408/409/429/5xx), same table
/// `providers/src/retry.rs::should_retry` uses for a single HTTP request
/// retry, reused here for the dispatcher's credential-rotating retry loop.
fn should_retry_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 409 | 429 | 500 | 502 | 503 | 504 | 520..=599)
}

#[must_use]
pub fn build_http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .expect("reqwest client with default TLS config builds")
}
