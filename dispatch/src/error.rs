//! Request Dispatcher error type (§4.F, §7).

use crate::upstream::UpstreamCallError;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("malformed request: {0}")]
    Normalize(#[from] gateway_normalize::NormalizeError),

    #[error("translation error: {0}")]
    Translate(#[from] gateway_translate::TranslateError),

    /// Surfaced to the HTTP layer as 503 with `retry-after` (§7).
    #[error("no credential became eligible before the deadline")]
    NoCredentialAvailable { retry_after_secs: u64 },

    /// A non-retryable upstream failure, surfaced verbatim (§7 `UPSTREAM_4XX`).
    #[error("upstream error: {0}")]
    Upstream(String),

    /// `MAX_ATTEMPTS` exhausted; the final upstream error is surfaced verbatim (§4.F step 3).
    #[error("exhausted {attempts} attempts, last error: {last}")]
    AttemptsExhausted { attempts: u32, last: String },
}

impl DispatchError {
    #[must_use]
    pub fn from_last_call_error(attempts: u32, last: &UpstreamCallError) -> Self {
        Self::AttemptsExhausted { attempts, last: last.to_string() }
    }
}
