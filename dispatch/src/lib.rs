//! Request Dispatcher (§4.F): ties the Message Normalizer, Credential Pool,
//! and Protocol Translator together into the per-request retry loop.
//!
//! Grounded on the "acquire a provider call, drive a stream, react to
//! terminal vs. retryable outcomes" shape of `App::start_streaming` /
//! `process_stream_events`, and on a retryable-status classification
//! generalized here from a single HTTP retry policy into a loop that also
//! rotates credentials (`gateway_credentials::CredentialPool`) between
//! attempts.

pub mod error;
pub mod upstream;

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use futures_util::StreamExt;

use gateway_credentials::{CredentialPool, Outcome};
use gateway_normalize::NormalizeInput;
use gateway_sigstore::SignatureStore;
use gateway_types::{
    ApiDialect, BlockKind, CanonicalMessage, ClientKind, FingerprintKind, Role, Signature,
    SignatureRecord, TranslatorEvent, fingerprint,
};
use gateway_translate::{ParseResult, Pipeline, UpstreamParser};

pub use error::DispatchError;
pub use upstream::{UpstreamCallError, UpstreamClient, UpstreamStream};

/// `MAX_ATTEMPTS` (§4.F step 2): one initial call plus up to two retries
/// against a different credential.
pub const MAX_ATTEMPTS: u32 = 3;

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// One inbound request, ready to be normalized and dispatched.
pub struct DispatchRequest<'a> {
    pub model: String,
    pub dialect: ApiDialect,
    pub body: &'a serde_json::Value,
    pub hijack_header: Option<&'a str>,
    pub user_agent: Option<&'a str>,
    pub deadline: Instant,
}

/// The wire frames produced for one request, already encoded for the
/// client's dialect, plus the client kind the normalizer inferred (the
/// HTTP layer uses this to pick response headers/content-type).
pub struct DispatchOutcome {
    pub frames: Vec<String>,
    pub client_kind: ClientKind,
}

/// Ties 4.C (normalize), 4.E (credential pool), and 4.D (translator)
/// together behind the retry loop in §4.F.
pub struct Dispatcher {
    store: Arc<SignatureStore>,
    credentials: CredentialPool,
    client: Arc<dyn UpstreamClient>,
    max_attempts: u32,
}

impl Dispatcher {
    #[must_use]
    pub fn new(store: Arc<SignatureStore>, credentials: CredentialPool, client: Arc<dyn UpstreamClient>) -> Self {
        Self { store, credentials, client, max_attempts: MAX_ATTEMPTS }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Runs §4.F end to end: normalize, then up to `max_attempts` acquire +
    /// call + drive cycles, rotating credentials between retryable
    /// failures.
    pub async fn dispatch(&self, request: DispatchRequest<'_>) -> Result<DispatchOutcome, DispatchError> {
        let now = now_secs();
        let normalize_input = NormalizeInput {
            dialect: request.dialect,
            body: request.body,
            hijack_header: request.hijack_header,
            user_agent: request.user_agent,
        };
        let normalized = gateway_normalize::normalize(&self.store, &normalize_input, now)?;

        let user_texts: Vec<String> = normalized
            .messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(CanonicalMessage::concatenated_text)
            .collect();

        let upstream_body = gateway_normalize::encode_upstream_body(&request.model, &normalized.messages);

        let mut last_error: Option<UpstreamCallError> = None;

        for _attempt in 0..self.max_attempts {
            let credential_id = match self.acquire(&request.model, request.deadline).await {
                Ok(id) => id,
                Err(retry_after_secs) => return Err(DispatchError::NoCredentialAvailable { retry_after_secs }),
            };

            let call_result = self.client.call(&credential_id, &request.model, &upstream_body).await;

            let outcome = match call_result {
                Err(err) => Err(err),
                Ok(stream) => {
                    self.drive(stream, normalized.client_kind, request.dialect, &user_texts).await
                }
            };

            match outcome {
                Ok(frames) => {
                    self.credentials.release(&credential_id, &request.model, Outcome::Success);
                    return Ok(DispatchOutcome { frames, client_kind: normalized.client_kind });
                }
                Err(UpstreamCallError::RateLimited) => {
                    self.credentials.release(&credential_id, &request.model, Outcome::RateLimited);
                    last_error = Some(UpstreamCallError::RateLimited);
                }
                Err(UpstreamCallError::Recoverable(msg)) => {
                    self.credentials.release(&credential_id, &request.model, Outcome::OtherError);
                    last_error = Some(UpstreamCallError::Recoverable(msg));
                }
                Err(err @ UpstreamCallError::NonRetryable(_)) => {
                    self.credentials.release(&credential_id, &request.model, Outcome::OtherError);
                    return Err(DispatchError::Upstream(err.to_string()));
                }
            }
        }

        let last = last_error.unwrap_or_else(|| UpstreamCallError::Recoverable("no attempts made".into()));
        Err(DispatchError::from_last_call_error(self.max_attempts, &last))
    }

    /// §4.E `acquire`, off the async executor since the pool's wait is a
    /// blocking condvar (§9 "do not poll").
    async fn acquire(&self, model: &str, deadline: Instant) -> Result<String, u64> {
        let pool = self.credentials.clone();
        let model = model.to_string();
        tokio::task::spawn_blocking(move || pool.acquire(&model, deadline))
            .await
            .expect("credential pool acquire task panicked")
            .map_err(|err| match err {
                gateway_credentials::CredentialError::Deadline { retry_after_secs } => retry_after_secs,
                _ => 0,
            })
    }

    /// Drives one upstream stream through the translator/encoder pipeline
    /// (§4.D), intercepting `SignatureDelta` to additionally register the
    /// request's session key (§4.F step 2c) alongside the text-fingerprint
    /// keys the translator already registers on its own (§4.D
    /// `SignatureDelta` row).
    async fn drive(
        &self,
        mut stream: UpstreamStream,
        client_kind: ClientKind,
        dialect: ApiDialect,
        user_texts: &[String],
    ) -> Result<Vec<String>, UpstreamCallError> {
        let mut pipeline = Pipeline::new(&self.store, client_kind, dialect);
        let mut parser = UpstreamParser::new();
        let mut frames = Vec::new();
        let mut current_thinking = String::new();
        let mut done = false;

        while let Some(item) = stream.next().await {
            let json = item?;
            let parsed = parser
                .parse(&json)
                .map_err(|err| UpstreamCallError::NonRetryable(err.to_string()))?;

            let events = match parsed {
                ParseResult::Events(events) => events,
                ParseResult::Done(events) => {
                    done = true;
                    events
                }
            };

            for event in events {
                track_thinking_text(&mut current_thinking, &event);
                if let TranslatorEvent::SignatureDelta(ref sig) = event {
                    register_session_signature(&self.store, user_texts, client_kind, sig, &current_thinking, now_secs());
                }
                let wire_frames = pipeline
                    .feed(event)
                    .map_err(|err| UpstreamCallError::NonRetryable(err.to_string()))?;
                frames.extend(wire_frames);
            }

            if done {
                break;
            }
        }

        if done {
            Ok(frames)
        } else {
            Err(UpstreamCallError::Recoverable("upstream stream ended before message_stop".into()))
        }
    }
}

fn track_thinking_text(buf: &mut String, event: &TranslatorEvent) {
    match event {
        TranslatorEvent::BlockStart { kind: BlockKind::Thinking, .. } => buf.clear(),
        TranslatorEvent::ThinkingDelta(delta) => buf.push_str(delta),
        _ => {}
    }
}

/// Registers the current request's session-key candidates (last 3/2/1 user
/// message texts) against a just-observed signature, so a *future* request
/// whose history has dropped this signature can recover it via 4.B layer 5
/// even if the exact-text/prefix/suffix layers also miss (e.g. the client
/// truncated or summarized the thinking text but kept the same turn
/// structure).
fn register_session_signature(
    store: &SignatureStore,
    user_texts: &[String],
    client_kind: ClientKind,
    signature: &Signature,
    thinking_text: &str,
    now: u64,
) {
    if user_texts.is_empty() || thinking_text.is_empty() {
        return;
    }
    let refs: Vec<&str> = user_texts.iter().map(String::as_str).collect();
    let candidates = fingerprint::session_key_candidates(&refs);
    if candidates.is_empty() {
        return;
    }
    let id = store.next_id();
    let record = SignatureRecord {
        id,
        signature: signature.clone(),
        text: thinking_text.to_string(),
        client_kind,
        created_at: now,
        last_access: now,
    };
    let keys = candidates
        .into_iter()
        .map(|fp| (FingerprintKind::Session, fp.to_string()))
        .collect();
    store.put(record, keys);
}
