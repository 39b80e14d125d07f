//! Canonical message model (§3.3).
//!
//! A real sum type, not a role tag plus optional fields: `Block` names each
//! shape a message element can take, and a message is an ordered sequence of
//! them.

use serde::{Deserialize, Serialize};

use crate::proofs::NonEmptyString;
use crate::signature::Signature;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// One element of a canonical message's content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Block {
    Text {
        text: String,
    },
    /// Invariant: a `signature` is valid only for the exact `text` that
    /// produced it upstream. Mutating `text` without clearing `signature`
    /// violates §3.1/§3.3 and must never happen — construct a new `Thinking`
    /// instead of editing one in place.
    Thinking {
        text: String,
        signature: Option<Signature>,
        redacted: bool,
    },
    ToolUse {
        id: NonEmptyString,
        name: NonEmptyString,
        input_json: serde_json::Value,
    },
    ToolResult {
        tool_use_id: NonEmptyString,
        content: String,
    },
    Image {
        media_type: NonEmptyString,
        data: String,
    },
}

impl Block {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    #[must_use]
    pub fn thinking(text: impl Into<String>) -> Self {
        Self::Thinking {
            text: text.into(),
            signature: None,
            redacted: false,
        }
    }

    #[must_use]
    pub fn thinking_signed(text: impl Into<String>, signature: Signature) -> Self {
        Self::Thinking {
            text: text.into(),
            signature: Some(signature),
            redacted: false,
        }
    }

    #[must_use]
    pub fn is_thinking(&self) -> bool {
        matches!(self, Self::Thinking { .. })
    }

    #[must_use]
    pub fn thinking_text(&self) -> Option<&str> {
        match self {
            Self::Thinking { text, .. } => Some(text.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn thinking_signature(&self) -> Option<&Signature> {
        match self {
            Self::Thinking { signature, .. } => signature.as_ref(),
            _ => None,
        }
    }

    /// Returns a copy with `signature` attached; panics in debug builds if
    /// called on a non-`Thinking` block, since that would be a caller bug
    /// (recovery only ever attaches signatures to thinking blocks).
    #[must_use]
    pub fn with_recovered_signature(self, signature: Signature) -> Self {
        match self {
            Self::Thinking {
                text, redacted, ..
            } => Self::Thinking {
                text,
                signature: Some(signature),
                redacted,
            },
            other => {
                debug_assert!(false, "with_recovered_signature called on non-thinking block");
                other
            }
        }
    }
}

/// An ordered, role-tagged sequence of content blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalMessage {
    pub role: Role,
    pub blocks: Vec<Block>,
}

impl CanonicalMessage {
    #[must_use]
    pub fn new(role: Role, blocks: Vec<Block>) -> Self {
        Self { role, blocks }
    }

    /// Text content of the last user message's textual blocks, concatenated.
    /// Used to build the session-key fingerprint inputs (§3.2).
    #[must_use]
    pub fn concatenated_text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                Block::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thinking_without_signature_round_trips() {
        let block = Block::thinking("let me check");
        assert!(block.is_thinking());
        assert_eq!(block.thinking_text(), Some("let me check"));
        assert!(block.thinking_signature().is_none());
    }

    #[test]
    fn recovered_signature_attaches_to_thinking() {
        let block = Block::thinking("let me check")
            .with_recovered_signature(Signature::new("SIG1"));
        assert_eq!(block.thinking_signature().map(Signature::as_str), Some("SIG1"));
    }

    #[test]
    fn concatenated_text_joins_text_blocks_only() {
        let msg = CanonicalMessage::new(
            Role::User,
            vec![Block::text("hello "), Block::thinking("skip"), Block::text("world")],
        );
        assert_eq!(msg.concatenated_text(), "hello world");
    }
}
