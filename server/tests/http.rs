//! End-to-end HTTP tests against the axum router (§6), using a fake
//! `UpstreamClient` rather than `wiremock` for the core request path
//! (there's no real HTTP between the router and the dispatcher) and
//! `tower::ServiceExt::oneshot` to drive requests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream};
use gateway_credentials::CredentialPool;
use gateway_dispatch::{Dispatcher, UpstreamCallError, UpstreamClient, UpstreamStream};
use gateway_sigstore::SignatureStore;
use gateway_types::{Credential, CredentialKind, DEFAULT_MAX_BACKOFF_LEVEL};
use serde_json::json;
use tower::ServiceExt;

struct FixedUpstream {
    events: Mutex<Vec<serde_json::Value>>,
}

impl UpstreamClient for FixedUpstream {
    fn call<'a>(
        &'a self,
        _credential_id: &'a str,
        _model: &'a str,
        _body: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<UpstreamStream, UpstreamCallError>> {
        Box::pin(async move {
            let events = self.events.lock().unwrap().clone();
            let stream: BoxStream<'static, Result<serde_json::Value, UpstreamCallError>> =
                Box::pin(stream::iter(events.into_iter().map(Ok)));
            Ok(stream)
        })
    }
}

fn text_message_script(text: &str) -> Vec<serde_json::Value> {
    vec![
        json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
        json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": text}}),
        json!({"type": "content_block_stop", "index": 0}),
        json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}}),
        json!({"type": "message_stop"}),
    ]
}

fn test_state(admin_password: Option<&str>) -> gateway_server::state::AppState {
    let store = Arc::new(SignatureStore::open_in_memory(100).unwrap());
    let credentials = CredentialPool::new(vec![Credential::new("c1", CredentialKind::Antigravity)], DEFAULT_MAX_BACKOFF_LEVEL);
    let upstream = Arc::new(FixedUpstream { events: Mutex::new(text_message_script("hello")) });
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&store), credentials.clone(), upstream));
    gateway_server::state::AppState {
        dispatcher,
        store,
        credentials,
        admin_password: admin_password.map(str::to_string),
        request_timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn openai_endpoint_streams_text_delta() {
    let app = gateway_server::routes::build_router(test_state(None));
    let body = json!({"model": "m", "messages": [{"role": "user", "content": "hi"}]});
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("hello"));
}

#[tokio::test]
async fn admin_endpoint_rejects_wrong_password() {
    let app = gateway_server::routes::build_router(test_state(Some("secret")));
    let request = Request::builder()
        .method("GET")
        .uri("/api/credentials/backoff-status?password=wrong")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_endpoint_accepts_correct_password() {
    let app = gateway_server::routes::build_router(test_state(Some("secret")));
    let request = Request::builder()
        .method("GET")
        .uri("/api/credentials/backoff-status?password=secret")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
