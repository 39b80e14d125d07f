//! Vendor NDJSON encoder (§4.D output table, NDJSON column).
//!
//! One JSON object per line (§8 property 5). The vendor protocol has no
//! streaming-tool-arguments node type (§4.D "NDJSON note") so tool calls are
//! always emitted whole, after full accumulation — a known design
//! limitation, not a bug.

use gateway_types::FinishReason;
use serde_json::json;

use crate::state_machine::DownstreamOp;

fn line(value: serde_json::Value) -> String {
    format!("{value}\n")
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

#[derive(Default)]
pub struct NdjsonEncoder;

impl NdjsonEncoder {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    pub fn encode(&mut self, op: &DownstreamOp) -> Vec<String> {
        match op {
            DownstreamOp::TextBlockStart => Vec::new(),
            DownstreamOp::TextDelta(text) => {
                vec![line(json!({"type": 0, "data": {"text": text, "delta": true}}))]
            }
            DownstreamOp::TextBlockStop => Vec::new(),

            DownstreamOp::ThinkingBlockStart | DownstreamOp::ThinkingDelta(_) | DownstreamOp::SignatureDelta(_) => {
                Vec::new()
            }
            DownstreamOp::ThinkingBlockStop { text, signature } => {
                let mut data = serde_json::Map::new();
                data.insert("thinking".to_string(), json!(text));
                if let Some(sig) = signature {
                    data.insert("signature".to_string(), json!(sig.as_str()));
                }
                vec![line(json!({"type": 6, "data": data}))]
            }

            DownstreamOp::ToolUseBlockStart { .. } | DownstreamOp::ToolInputDelta(_) => Vec::new(),
            DownstreamOp::ToolUseBlockStop { id, name, input_json } => {
                let input: serde_json::Value =
                    serde_json::from_str(input_json).unwrap_or(serde_json::Value::Null);
                vec![line(json!({
                    "type": 5,
                    "data": {"tool_use": {"id": id, "name": name, "input": input}},
                }))]
            }

            DownstreamOp::MessageStop(reason) => {
                vec![line(json!({"type": 3, "stop_reason": stop_reason_str(*reason)}))]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_types::Signature;

    #[test]
    fn every_line_is_standalone_json_terminated_once() {
        let mut enc = NdjsonEncoder::new();
        let frames = enc.encode(&DownstreamOp::TextDelta("hi".into()));
        for frame in &frames {
            assert_eq!(frame.matches('\n').count(), 1);
            assert!(frame.ends_with('\n'));
            let body = frame.trim_end();
            let _: serde_json::Value = serde_json::from_str(body).expect("valid json line");
        }
    }

    #[test]
    fn thinking_node_carries_signature_when_present() {
        let mut enc = NdjsonEncoder::new();
        let frames = enc.encode(&DownstreamOp::ThinkingBlockStop {
            text: "Plan".into(),
            signature: Some(Signature::new("S")),
        });
        let value: serde_json::Value = serde_json::from_str(frames[0].trim_end()).unwrap();
        assert_eq!(value["type"], 6);
        assert_eq!(value["data"]["thinking"], "Plan");
        assert_eq!(value["data"]["signature"], "S");
    }

    #[test]
    fn tool_use_node_parses_input_json_into_object() {
        let mut enc = NdjsonEncoder::new();
        let frames = enc.encode(&DownstreamOp::ToolUseBlockStop {
            id: "ls".into(),
            name: "ls".into(),
            input_json: "{\"p\":\"/\"}".into(),
        });
        let value: serde_json::Value = serde_json::from_str(frames[0].trim_end()).unwrap();
        assert_eq!(value["type"], 5);
        assert_eq!(value["data"]["tool_use"]["input"]["p"], "/");
    }

    #[test]
    fn message_stop_node_has_type_three() {
        let mut enc = NdjsonEncoder::new();
        let frames = enc.encode(&DownstreamOp::MessageStop(FinishReason::ToolUse));
        let value: serde_json::Value = serde_json::from_str(frames[0].trim_end()).unwrap();
        assert_eq!(value["type"], 3);
        assert_eq!(value["stop_reason"], "tool_use");
    }
}
