//! OpenAI-compatible SSE encoder (§4.D output table, OpenAI column).
//!
//! OpenAI's wire format has no signature slot and no streaming tool-call
//! delta richer than raw string accumulation, so: thinking degrades to
//! `<think>…</think>` wrapped inside `delta.content` (§9 Open Question 3:
//! "source does the former"), and tool-call arguments are buffered and
//! emitted once, fully formed, at block stop.

use gateway_types::FinishReason;
use serde_json::json;

use crate::state_machine::DownstreamOp;

fn chunk(delta: serde_json::Value, finish_reason: Option<&str>) -> String {
    let body = json!({
        "object": "chat.completion.chunk",
        "choices": [{"index": 0, "delta": delta, "finish_reason": finish_reason}],
    });
    format!("data: {body}\n\n")
}

fn finish_reason_str(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::EndTurn | FinishReason::StopSequence => "stop",
        FinishReason::ToolUse => "tool_calls",
        FinishReason::MaxTokens => "length",
        FinishReason::Error => "stop",
    }
}

#[derive(Default)]
pub struct OpenAiEncoder {
    next_tool_index: u32,
    current_tool_index: u32,
}

impl OpenAiEncoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode(&mut self, op: &DownstreamOp) -> Vec<String> {
        match op {
            DownstreamOp::TextBlockStart => Vec::new(),
            DownstreamOp::TextDelta(text) => vec![chunk(json!({"content": text}), None)],
            DownstreamOp::TextBlockStop => Vec::new(),

            DownstreamOp::ThinkingBlockStart => vec![chunk(json!({"content": "<think>"}), None)],
            DownstreamOp::ThinkingDelta(text) => vec![chunk(json!({"content": text}), None)],
            DownstreamOp::SignatureDelta(_) => Vec::new(),
            DownstreamOp::ThinkingBlockStop { .. } => vec![chunk(json!({"content": "</think>"}), None)],

            DownstreamOp::ToolUseBlockStart { .. } => {
                self.current_tool_index = self.next_tool_index;
                self.next_tool_index += 1;
                Vec::new()
            }
            DownstreamOp::ToolInputDelta(_) => Vec::new(),
            DownstreamOp::ToolUseBlockStop { id, name, input_json } => vec![chunk(
                json!({"tool_calls": [{
                    "index": self.current_tool_index,
                    "id": id,
                    "type": "function",
                    "function": {"name": name, "arguments": input_json},
                }]}),
                None,
            )],

            DownstreamOp::MessageStop(reason) => vec![
                chunk(json!({}), Some(finish_reason_str(*reason))),
                "data: [DONE]\n\n".to_string(),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thinking_wraps_in_think_tags_with_no_signature() {
        let mut enc = OpenAiEncoder::new();
        let frames = [
            enc.encode(&DownstreamOp::ThinkingBlockStart),
            enc.encode(&DownstreamOp::ThinkingDelta("Plan".into())),
            enc.encode(&DownstreamOp::ThinkingBlockStop { text: "Plan".into(), signature: None }),
        ]
        .concat();
        let joined = frames.join("");
        assert!(joined.contains("<think>"));
        assert!(joined.contains("Plan"));
        assert!(joined.contains("</think>"));
        assert!(!joined.contains("signature"));
    }

    #[test]
    fn tool_call_emits_exactly_one_combined_frame_at_stop() {
        let mut enc = OpenAiEncoder::new();
        let start_frames = enc.encode(&DownstreamOp::ToolUseBlockStart { id: "ls".into(), name: "ls".into() });
        assert!(start_frames.is_empty());
        let frames = enc.encode(&DownstreamOp::ToolUseBlockStop {
            id: "ls".into(),
            name: "ls".into(),
            input_json: "{\"p\":\"/\"}".into(),
        });
        assert_eq!(frames.len(), 1);
        assert!(frames[0].contains("\"id\":\"ls\""));
        assert!(frames[0].contains("\"name\":\"ls\""));
        assert!(frames[0].contains("{\\\"p\\\":\\\"/\\\"}"));
    }

    #[test]
    fn message_stop_emits_finish_reason_then_done() {
        let mut enc = OpenAiEncoder::new();
        let frames = enc.encode(&DownstreamOp::MessageStop(FinishReason::ToolUse));
        assert_eq!(frames.len(), 2);
        assert!(frames[0].contains("\"finish_reason\":\"tool_calls\""));
        assert_eq!(frames[1], "data: [DONE]\n\n");
    }
}
