//! Translator error type.
//!
//! This is the one place the Protocol Translator can fail: a missed
//! transition in the state machine (§9 "each missed transition must be a
//! compile-time or explicit runtime error, not silent fall-through").
//! Errors here are terminal for the request (§7).

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TranslateError {
    #[error("text delta received while no block is open")]
    TextDeltaWithoutBlock,
    #[error("thinking delta received while not in a thinking block")]
    ThinkingDeltaOutsideThinking,
    #[error("signature delta received while not in a thinking block")]
    SignatureDeltaOutsideThinking,
    #[error("tool input delta received while not in a tool_use block")]
    ToolInputDeltaOutsideToolUse,
    #[error("block_start received while another block is already open")]
    BlockAlreadyOpen,
    #[error("block_stop received with no open block")]
    BlockStopWithoutBlock,
    #[error("malformed tool_use input_json at block stop: {0}")]
    MalformedToolJson(String),
}
