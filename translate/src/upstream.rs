//! Parses upstream's Anthropic-native SSE payloads into the internal event
//! alphabet (§4.D, §6 "Upstream contract").
//!
//! Grounded directly on `providers/src/claude.rs`'s `ClaudeParser` (the
//! `SseParser::parse` match over `typed::Event`) and the typed event shapes
//! in `providers/src/sse_types.rs`'s `claude` module. The upstream dialect
//! *is* our internal vocabulary per §6, so this module's only job is
//! deserializing the JSON into a local typed mirror of that dialect and
//! re-expressing each variant as zero or more `TranslatorEvent`s.

use serde::Deserialize;

use gateway_types::{BlockKind, BlockStartMeta, FinishReason, Signature, TranslatorEvent};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Event {
    MessageStart {
        #[serde(default)]
        message: Option<serde_json::Value>,
    },
    MessageDelta {
        #[serde(default)]
        delta: Option<MessageDeltaInfo>,
    },
    ContentBlockStart {
        #[serde(default)]
        index: u32,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        #[serde(default)]
        index: u32,
        delta: Delta,
    },
    ContentBlockStop {
        #[serde(default)]
        index: u32,
    },
    MessageStop,
    Ping,
    Error {
        error: ErrorInfo,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct ErrorInfo {
    #[serde(default, rename = "type")]
    error_type: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    ToolUse,
    #[serde(other)]
    Unknown,
}

impl From<StopReason> for FinishReason {
    fn from(value: StopReason) -> Self {
        match value {
            StopReason::EndTurn | StopReason::Unknown => FinishReason::EndTurn,
            StopReason::MaxTokens => FinishReason::MaxTokens,
            StopReason::StopSequence => FinishReason::StopSequence,
            StopReason::ToolUse => FinishReason::ToolUse,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageDeltaInfo {
    #[serde(default)]
    stop_reason: Option<StopReason>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta { text: String },
    ThinkingDelta { thinking: String },
    SignatureDelta { signature: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamParseError {
    #[error("malformed upstream event: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("upstream tool call missing id")]
    MissingToolId,
    #[error("upstream tool call missing name")]
    MissingToolName,
    #[error("upstream error: {0}")]
    UpstreamError(String),
}

/// What a single parsed upstream line means for the translator driving loop.
pub enum ParseResult {
    /// More events may follow on the stream.
    Events(Vec<TranslatorEvent>),
    /// `message_stop` was observed; the caller should stop reading after
    /// processing the bundled events (normally just `MessageStop` itself).
    Done(Vec<TranslatorEvent>),
}

/// Stateful upstream parser: one instance per upstream request, matching
/// `ClaudeParser`'s per-request lifetime.
#[derive(Default)]
pub struct UpstreamParser {
    last_stop_reason: Option<StopReason>,
}

impl UpstreamParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&mut self, json: &serde_json::Value) -> Result<ParseResult, UpstreamParseError> {
        let event: Event = serde_json::from_value(json.clone())?;
        let mut events = Vec::new();

        match event {
            Event::MessageStart { .. } => {}

            Event::MessageDelta { delta } => {
                if let Some(MessageDeltaInfo { stop_reason: Some(reason) }) = delta {
                    self.last_stop_reason = Some(reason);
                }
            }

            Event::ContentBlockStart { content_block, .. } => match content_block {
                ContentBlock::Thinking { .. } => {
                    events.push(TranslatorEvent::BlockStart {
                        kind: BlockKind::Thinking,
                        meta: BlockStartMeta::default(),
                    });
                }
                ContentBlock::Text { .. } => {
                    events.push(TranslatorEvent::BlockStart {
                        kind: BlockKind::Text,
                        meta: BlockStartMeta::default(),
                    });
                }
                ContentBlock::ToolUse { id, name } => {
                    if id.is_empty() {
                        return Err(UpstreamParseError::MissingToolId);
                    }
                    if name.is_empty() {
                        return Err(UpstreamParseError::MissingToolName);
                    }
                    events.push(TranslatorEvent::BlockStart {
                        kind: BlockKind::ToolUse,
                        meta: BlockStartMeta {
                            tool_id: Some(id),
                            tool_name: Some(name),
                        },
                    });
                }
                ContentBlock::Unknown => {}
            },

            Event::ContentBlockDelta { delta, .. } => match delta {
                Delta::TextDelta { text } => events.push(TranslatorEvent::TextDelta(text)),
                Delta::ThinkingDelta { thinking } => {
                    events.push(TranslatorEvent::ThinkingDelta(thinking));
                }
                Delta::SignatureDelta { signature } => {
                    events.push(TranslatorEvent::SignatureDelta(Signature::new(signature)));
                }
                Delta::InputJsonDelta { partial_json } => {
                    events.push(TranslatorEvent::ToolInputDelta(partial_json));
                }
                Delta::Unknown => {}
            },

            Event::ContentBlockStop { .. } => {
                events.push(TranslatorEvent::BlockStop);
            }

            Event::MessageStop => {
                let reason = self.last_stop_reason.take().map_or(FinishReason::EndTurn, Into::into);
                events.push(TranslatorEvent::MessageStop(reason));
                return Ok(ParseResult::Done(events));
            }

            Event::Error { error } => {
                let msg = if error.message.is_empty() {
                    format!("upstream stream error: {}", error.error_type)
                } else {
                    error.message
                };
                return Err(UpstreamParseError::UpstreamError(msg));
            }

            Event::Ping | Event::Unknown => {}
        }

        Ok(ParseResult::Events(events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn events_of(result: ParseResult) -> Vec<TranslatorEvent> {
        match result {
            ParseResult::Events(e) | ParseResult::Done(e) => e,
        }
    }

    #[test]
    fn content_block_start_thinking_maps_to_block_start() {
        let mut parser = UpstreamParser::new();
        let events = events_of(
            parser
                .parse(&json!({
                    "type": "content_block_start",
                    "index": 0,
                    "content_block": {"type": "thinking", "thinking": ""}
                }))
                .unwrap(),
        );
        assert_eq!(
            events,
            vec![TranslatorEvent::BlockStart {
                kind: BlockKind::Thinking,
                meta: BlockStartMeta::default()
            }]
        );
    }

    #[test]
    fn signature_delta_carries_opaque_bytes_unchanged() {
        let mut parser = UpstreamParser::new();
        let events = events_of(
            parser
                .parse(&json!({
                    "type": "content_block_delta",
                    "index": 0,
                    "delta": {"type": "signature_delta", "signature": "SIG_RAW_BYTES=="}
                }))
                .unwrap(),
        );
        assert_eq!(events, vec![TranslatorEvent::SignatureDelta(Signature::new("SIG_RAW_BYTES=="))]);
    }

    #[test]
    fn message_stop_carries_last_observed_stop_reason() {
        let mut parser = UpstreamParser::new();
        parser
            .parse(&json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}}))
            .unwrap();
        let result = parser.parse(&json!({"type": "message_stop"})).unwrap();
        match result {
            ParseResult::Done(events) => {
                assert_eq!(events, vec![TranslatorEvent::MessageStop(FinishReason::ToolUse)]);
            }
            ParseResult::Events(_) => panic!("expected Done"),
        }
    }

    #[test]
    fn tool_use_block_start_requires_id_and_name() {
        let mut parser = UpstreamParser::new();
        let err = parser
            .parse(&json!({
                "type": "content_block_start",
                "index": 0,
                "content_block": {"type": "tool_use", "id": "", "name": "ls"}
            }))
            .unwrap_err();
        assert!(matches!(err, UpstreamParseError::MissingToolId));
    }

    #[test]
    fn upstream_error_event_propagates_as_error() {
        let mut parser = UpstreamParser::new();
        let err = parser
            .parse(&json!({"type": "error", "error": {"type": "overloaded_error", "message": "busy"}}))
            .unwrap_err();
        assert!(matches!(err, UpstreamParseError::UpstreamError(msg) if msg == "busy"));
    }

    #[test]
    fn ping_produces_no_events() {
        let mut parser = UpstreamParser::new();
        let events = events_of(parser.parse(&json!({"type": "ping"})).unwrap());
        assert!(events.is_empty());
    }
}
