//! Anthropic SSE encoder (§4.D output table, Anthropic column).
//!
//! The only format that can carry a `signature_delta`; every other encoder
//! degrades thinking to plain text because their wire format has no slot
//! for opaque signature bytes (§9 "Opaque signatures").

use gateway_types::FinishReason;
use serde_json::json;

use crate::state_machine::DownstreamOp;

fn sse_frame(event: &str, data: &serde_json::Value) -> String {
    format!("event: {event}\ndata: {data}\n\n")
}

fn stop_reason_str(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::EndTurn => "end_turn",
        FinishReason::ToolUse => "tool_use",
        FinishReason::MaxTokens => "max_tokens",
        FinishReason::StopSequence => "stop_sequence",
        FinishReason::Error => "end_turn",
    }
}

/// Tracks the content-block `index` Anthropic SSE frames carry; increments
/// once per `*BlockStart`, matching how many blocks have opened so far.
#[derive(Default)]
pub struct AnthropicEncoder {
    next_index: u32,
    current_index: u32,
}

impl AnthropicEncoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode(&mut self, op: &DownstreamOp) -> Vec<String> {
        match op {
            DownstreamOp::TextBlockStart => {
                self.current_index = self.open_block();
                vec![sse_frame(
                    "content_block_start",
                    &json!({"type": "content_block_start", "index": self.current_index, "content_block": {"type": "text", "text": ""}}),
                )]
            }
            DownstreamOp::TextDelta(text) => vec![sse_frame(
                "content_block_delta",
                &json!({"type": "content_block_delta", "index": self.current_index, "delta": {"type": "text_delta", "text": text}}),
            )],
            DownstreamOp::TextBlockStop => vec![self.stop_frame()],

            DownstreamOp::ThinkingBlockStart => {
                self.current_index = self.open_block();
                vec![sse_frame(
                    "content_block_start",
                    &json!({"type": "content_block_start", "index": self.current_index, "content_block": {"type": "thinking", "thinking": ""}}),
                )]
            }
            DownstreamOp::ThinkingDelta(text) => vec![sse_frame(
                "content_block_delta",
                &json!({"type": "content_block_delta", "index": self.current_index, "delta": {"type": "thinking_delta", "thinking": text}}),
            )],
            DownstreamOp::SignatureDelta(sig) => vec![sse_frame(
                "content_block_delta",
                &json!({"type": "content_block_delta", "index": self.current_index, "delta": {"type": "signature_delta", "signature": sig.as_str()}}),
            )],
            DownstreamOp::ThinkingBlockStop { .. } => vec![self.stop_frame()],

            DownstreamOp::ToolUseBlockStart { id, name } => {
                self.current_index = self.open_block();
                vec![sse_frame(
                    "content_block_start",
                    &json!({"type": "content_block_start", "index": self.current_index, "content_block": {"type": "tool_use", "id": id, "name": name, "input": {}}}),
                )]
            }
            DownstreamOp::ToolInputDelta(partial) => vec![sse_frame(
                "content_block_delta",
                &json!({"type": "content_block_delta", "index": self.current_index, "delta": {"type": "input_json_delta", "partial_json": partial}}),
            )],
            DownstreamOp::ToolUseBlockStop { .. } => vec![self.stop_frame()],

            DownstreamOp::MessageStop(reason) => vec![sse_frame(
                "message_stop",
                &json!({"type": "message_stop", "stop_reason": stop_reason_str(*reason)}),
            )],
        }
    }

    fn open_block(&mut self) -> u32 {
        let idx = self.next_index;
        self.next_index += 1;
        idx
    }

    fn stop_frame(&self) -> String {
        sse_frame(
            "content_block_stop",
            &json!({"type": "content_block_stop", "index": self.current_index}),
        )
    }
}
