//! The upstream call boundary the dispatcher drives (§4.F, §6 "Upstream
//! contract").
//!
//! The transport layer is explicitly out of scope (§1): this crate defines
//! only the interface it consumes. `gateway-server` supplies the real
//! `reqwest`-backed implementation that talks to the Antigravity/Gemini CLI
//! endpoints; tests here and in `gateway-server` supply fakes. Modeled as a
//! boxed trait object (rather than `impl Trait`) so the dispatcher can hold
//! one `Arc<dyn UpstreamClient>` regardless of which concrete transport
//! backs it, matching `providers/src/retry.rs`'s closure-based
//! `send_with_retry` in spirit but as a swappable collaborator instead of a
//! free function, since the dispatcher needs to pick a different credential
//! (and therefore a different auth header) on every attempt.

use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;

/// One upstream SSE event, already split on `data:` framing and parsed as
/// JSON — the upstream dialect *is* the internal event vocabulary (§6), so
/// nothing upstream of `gateway_translate::UpstreamParser` needs to know
/// about SSE framing.
pub type UpstreamStream = BoxStream<'static, Result<serde_json::Value, UpstreamCallError>>;

/// How an upstream call or mid-stream failure should be treated by the
/// dispatcher's retry loop (§4.F, §7).
#[derive(Debug, Clone)]
pub enum UpstreamCallError {
    /// 429 or an upstream "resource exhausted" event — bump backoff, retry
    /// with a different credential (§3.5, §4.F step 2e).
    RateLimited,
    /// Transient failure (5xx, connection reset) — retry within the
    /// attempt budget without bumping backoff (§7 `RECOVERABLE_UPSTREAM`).
    Recoverable(String),
    /// Non-retryable failure — surfaced to the client verbatim (§7
    /// `UPSTREAM_4XX`).
    NonRetryable(String),
}

impl std::fmt::Display for UpstreamCallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate limited"),
            Self::Recoverable(msg) => write!(f, "recoverable upstream error: {msg}"),
            Self::NonRetryable(msg) => write!(f, "non-retryable upstream error: {msg}"),
        }
    }
}

/// Issues one upstream streaming call using a specific credential.
///
/// Implementations own the HTTP client, TLS, and OAuth header construction
/// (all out of scope per §1); this crate only needs the classified outcome.
pub trait UpstreamClient: Send + Sync {
    fn call<'a>(
        &'a self,
        credential_id: &'a str,
        model: &'a str,
        body: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<UpstreamStream, UpstreamCallError>>;
}
