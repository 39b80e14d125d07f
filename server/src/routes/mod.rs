pub mod admin;
pub mod chat;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

#[must_use]
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/v1/chat/completions", post(chat::chat_completions))
        .route("/antigravity/v1/messages", post(chat::messages))
        .route("/gateway/chat-stream", post(chat::chat_stream))
        .route("/api/credentials/backoff-status", get(admin::backoff_status))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
