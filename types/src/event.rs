//! The internal event alphabet upstream is normalized to (§4.D).
//!
//! Whatever the upstream dialect, events are reduced to this vocabulary
//! before the Protocol Translator's state machine sees them. Shared between
//! `gateway-translate` (which drives the state machine) and
//! `gateway-dispatch` (which intercepts `SignatureDelta` to also register
//! the session key in the Signature Store, per §4.F step 2c).

use serde::{Deserialize, Serialize};

use crate::signature::Signature;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    Thinking,
    Text,
    ToolUse,
}

/// Metadata carried by `BlockStart` for block kinds that need it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStartMeta {
    pub tool_id: Option<String>,
    pub tool_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    Error,
}

/// One normalized upstream event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TranslatorEvent {
    BlockStart { kind: BlockKind, meta: BlockStartMeta },
    TextDelta(String),
    ThinkingDelta(String),
    SignatureDelta(Signature),
    ToolInputDelta(String),
    BlockStop,
    MessageStop(FinishReason),
}
