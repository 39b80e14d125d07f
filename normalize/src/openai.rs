//! Decodes inbound OpenAI-compatible `/v1/chat/completions` request bodies
//! (§4.C, §6) into canonical messages.
//!
//! OpenAI's wire format has no native thinking-block or signature slot.
//! Per §4.D's own output rule, the gateway itself renders thinking as
//! `<think>…</think>` wrapped in assistant `content` when *replying* to an
//! OpenAI client; IDE plugins that replay that same history back to us
//! (§1 "frequently strip signatures") send it back the same way, so
//! `<think>…</think>` is extracted back into a `Thinking` block here,
//! always signature-less (OpenAI has nowhere to carry one) — recovery
//! (§4.B) is what reattaches it.

use serde::Deserialize;

use gateway_types::{Block, CanonicalMessage, Role};

use crate::error::NormalizeError;

#[derive(Debug, Deserialize)]
struct RequestBody {
    #[serde(default)]
    messages: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    role: WireRole,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
    #[serde(default)]
    tool_call_id: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(rename_all = "lowercase")]
enum WireRole {
    System,
    User,
    Assistant,
    Tool,
}

impl From<WireRole> for Role {
    fn from(role: WireRole) -> Self {
        match role {
            WireRole::System => Role::System,
            WireRole::User => Role::User,
            WireRole::Assistant => Role::Assistant,
            WireRole::Tool => Role::Tool,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunctionCall,
}

#[derive(Debug, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

pub fn decode(body: &serde_json::Value) -> Result<Vec<CanonicalMessage>, NormalizeError> {
    let parsed: RequestBody = serde_json::from_value(body.clone())?;
    Ok(parsed.messages.into_iter().map(convert_message).collect())
}

fn convert_message(msg: WireMessage) -> CanonicalMessage {
    let role = Role::from(msg.role);
    let mut blocks = Vec::new();

    if let Some(tool_call_id) = msg.tool_call_id {
        if let Ok(id) = gateway_types::NonEmptyString::new(tool_call_id) {
            blocks.push(Block::ToolResult {
                tool_use_id: id,
                content: msg.content.clone().unwrap_or_default(),
            });
        }
    } else if let Some(content) = msg.content {
        blocks.extend(split_think_tags(&content));
    }

    for call in msg.tool_calls {
        let input_json = serde_json::from_str(&call.function.arguments)
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));
        if let (Ok(id), Ok(name)) = (
            gateway_types::NonEmptyString::new(call.id),
            gateway_types::NonEmptyString::new(call.function.name),
        ) {
            blocks.push(Block::ToolUse { id, name, input_json });
        }
    }

    CanonicalMessage::new(role, blocks)
}

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Splits a `<think>…</think>`-wrapped string into `Thinking` and `Text`
/// blocks, preserving order. Content outside the tags becomes `Text`;
/// content inside becomes an unsigned `Thinking` block.
fn split_think_tags(content: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut rest = content;
    while let Some(start) = rest.find(THINK_OPEN) {
        if start > 0 {
            blocks.push(Block::text(rest[..start].to_string()));
        }
        let after_open = &rest[start + THINK_OPEN.len()..];
        match after_open.find(THINK_CLOSE) {
            Some(end) => {
                blocks.push(Block::thinking(after_open[..end].to_string()));
                rest = &after_open[end + THINK_CLOSE.len()..];
            }
            None => {
                // Unterminated tag: treat the remainder as thinking text.
                blocks.push(Block::thinking(after_open.to_string()));
                rest = "";
                break;
            }
        }
    }
    if !rest.is_empty() {
        blocks.push(Block::text(rest.to_string()));
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_plain_text_message() {
        let body = json!({"messages": [{"role": "user", "content": "hi"}]});
        let messages = decode(&body).unwrap();
        assert_eq!(messages[0].concatenated_text(), "hi");
    }

    #[test]
    fn splits_think_tags_out_of_assistant_content() {
        let body = json!({"messages": [{"role": "assistant", "content": "<think>Hmm, let me check...</think>Here you go"}]});
        let messages = decode(&body).unwrap();
        let blocks = &messages[0].blocks;
        assert!(blocks[0].is_thinking());
        assert_eq!(blocks[0].thinking_text(), Some("Hmm, let me check..."));
        assert!(blocks[0].thinking_signature().is_none());
        assert_eq!(blocks[1].thinking_text(), None);
    }

    #[test]
    fn decodes_tool_calls_with_canonicalized_arguments() {
        let body = json!({"messages": [{"role": "assistant", "content": null, "tool_calls": [
            {"id": "c1", "type": "function", "function": {"name": "ls", "arguments": "{\"p\":\"/\"}"}}
        ]}]});
        let messages = decode(&body).unwrap();
        assert!(matches!(messages[0].blocks[0], Block::ToolUse { .. }));
    }

    #[test]
    fn decodes_tool_result_message_via_tool_call_id() {
        let body = json!({"messages": [{"role": "tool", "tool_call_id": "c1", "content": "done"}]});
        let messages = decode(&body).unwrap();
        assert!(matches!(messages[0].blocks[0], Block::ToolResult { .. }));
    }
}
