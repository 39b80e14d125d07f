//! Wire dialects the gateway speaks (§6).

use serde::{Deserialize, Serialize};

/// Which of the three wire formats a request arrived on / a response must
/// be emitted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiDialect {
    /// `POST /antigravity/v1/messages` — Anthropic-native SSE.
    Anthropic,
    /// `POST /v1/chat/completions` — OpenAI-compatible SSE.
    OpenAi,
    /// `POST /gateway/chat-stream` — vendor NDJSON.
    Ndjson,
}

impl ApiDialect {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Ndjson => "ndjson",
        }
    }
}
