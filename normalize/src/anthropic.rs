//! Decodes inbound Anthropic-native `/antigravity/v1/messages` request
//! bodies (§4.C, §6) into canonical messages.
//!
//! Grounded on the typed-event style of `providers/src/sse_types.rs`: a
//! `#[serde(tag = "type")]` enum per content block, `#[serde(default)]` on
//! every optional field, rather than walking a raw `serde_json::Value`.

use serde::Deserialize;

use gateway_types::{Block, CanonicalMessage, Role, Signature};

use crate::error::NormalizeError;

#[derive(Debug, Deserialize)]
struct RequestBody {
    #[serde(default)]
    messages: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    role: WireRole,
    content: WireContent,
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

/// Anthropic's `content` field is either a plain string or a block array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Blocks(Vec<WireBlock>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
        #[serde(default)]
        signature: Option<String>,
    },
    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    ToolResult {
        #[serde(default)]
        tool_use_id: String,
        #[serde(default)]
        content: ToolResultContent,
    },
    Image {
        #[serde(default)]
        source: ImageSource,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum ToolResultContent {
    #[default]
    Empty,
    Text(String),
    Blocks(Vec<serde_json::Value>),
}

impl ToolResultContent {
    fn into_text(self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(s) => s,
            Self::Blocks(blocks) => blocks
                .into_iter()
                .filter_map(|b| b.get("text").and_then(|t| t.as_str()).map(str::to_string))
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ImageSource {
    #[serde(default)]
    media_type: String,
    #[serde(default)]
    data: String,
}

/// Decodes an Anthropic-format request body into canonical messages, in
/// wire order. `Thinking` blocks are carried through verbatim, signature
/// and all (signature recovery, §4.B, happens one layer up).
pub fn decode(body: &serde_json::Value) -> Result<Vec<CanonicalMessage>, NormalizeError> {
    let parsed: RequestBody = serde_json::from_value(body.clone())?;
    Ok(parsed.messages.into_iter().map(convert_message).collect())
}

/// Encodes normalized (post-recovery) canonical messages back into the
/// upstream request body (§6 "Upstream contract": upstream speaks the same
/// Anthropic-native dialect this module decodes). The reverse of `decode`,
/// used by the dispatcher (§4.F step 1) to build the request it sends
/// upstream once signature recovery has run. A `Thinking` block without a
/// `signature` should never reach here (§4.C drops or downgrades those to
/// text before normalization completes) — one is still encoded with the
/// `signature` field omitted rather than panicking, since silently sending
/// an unsigned thinking block upstream is safer than crashing the request.
#[must_use]
pub fn encode_upstream_body(model: &str, messages: &[CanonicalMessage]) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "stream": true,
        "messages": messages.iter().map(encode_message).collect::<Vec<_>>(),
    })
}

fn encode_message(message: &CanonicalMessage) -> serde_json::Value {
    serde_json::json!({
        "role": message.role.as_str(),
        "content": message.blocks.iter().map(encode_block).collect::<Vec<_>>(),
    })
}

fn encode_block(block: &Block) -> serde_json::Value {
    match block {
        Block::Text { text } => serde_json::json!({"type": "text", "text": text}),
        Block::Thinking { text, signature, .. } => {
            let mut value = serde_json::json!({"type": "thinking", "thinking": text});
            if let Some(signature) = signature {
                value["signature"] = serde_json::json!(signature.as_str());
            }
            value
        }
        Block::ToolUse { id, name, input_json } => serde_json::json!({
            "type": "tool_use",
            "id": id.as_str(),
            "name": name.as_str(),
            "input": input_json,
        }),
        Block::ToolResult { tool_use_id, content } => serde_json::json!({
            "type": "tool_result",
            "tool_use_id": tool_use_id.as_str(),
            "content": content,
        }),
        Block::Image { media_type, data } => serde_json::json!({
            "type": "image",
            "source": {"media_type": media_type.as_str(), "data": data},
        }),
    }
}

fn convert_message(msg: WireMessage) -> CanonicalMessage {
    let blocks = match msg.content {
        WireContent::Text(s) => vec![Block::Text { text: s }],
        WireContent::Blocks(blocks) => blocks.into_iter().filter_map(convert_block).collect(),
    };
    CanonicalMessage::new(msg.role.into(), blocks)
}

fn convert_block(block: WireBlock) -> Option<Block> {
    match block {
        WireBlock::Text { text } => Some(Block::Text { text }),
        WireBlock::Thinking { thinking, signature } => Some(Block::Thinking {
            text: thinking,
            signature: signature.map(Signature::new),
            redacted: false,
        }),
        WireBlock::ToolUse { id, name, input } => {
            let id = gateway_types::NonEmptyString::new(id).ok()?;
            let name = gateway_types::NonEmptyString::new(name).ok()?;
            Some(Block::ToolUse { id, name, input_json: input })
        }
        WireBlock::ToolResult { tool_use_id, content } => {
            let tool_use_id = gateway_types::NonEmptyString::new(tool_use_id).ok()?;
            Some(Block::ToolResult { tool_use_id, content: content.into_text() })
        }
        WireBlock::Image { source } => {
            let media_type = gateway_types::NonEmptyString::new(source.media_type).ok()?;
            Some(Block::Image { media_type, data: source.data })
        }
        WireBlock::Unknown => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_plain_string_content() {
        let body = json!({"messages": [{"role": "user", "content": "hello"}]});
        let messages = decode(&body).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].concatenated_text(), "hello");
    }

    #[test]
    fn decodes_thinking_block_with_signature() {
        let body = json!({"messages": [{"role": "assistant", "content": [
            {"type": "thinking", "thinking": "T1", "signature": "SIG1"}
        ]}]});
        let messages = decode(&body).unwrap();
        let block = &messages[0].blocks[0];
        assert_eq!(block.thinking_text(), Some("T1"));
        assert_eq!(block.thinking_signature().map(Signature::as_str), Some("SIG1"));
    }

    #[test]
    fn decodes_thinking_block_missing_signature() {
        let body = json!({"messages": [{"role": "assistant", "content": [
            {"type": "thinking", "thinking": "T1"}
        ]}]});
        let messages = decode(&body).unwrap();
        assert!(messages[0].blocks[0].thinking_signature().is_none());
    }

    #[test]
    fn decodes_tool_use_and_tool_result() {
        let body = json!({"messages": [
            {"role": "assistant", "content": [{"type": "tool_use", "id": "t1", "name": "ls", "input": {"p": "/"}}]},
            {"role": "tool", "content": [{"type": "tool_result", "tool_use_id": "t1", "content": "ok"}]},
        ]});
        let messages = decode(&body).unwrap();
        assert!(matches!(messages[0].blocks[0], Block::ToolUse { .. }));
        assert!(matches!(messages[1].blocks[0], Block::ToolResult { .. }));
    }

    #[test]
    fn unknown_block_types_are_skipped() {
        let body = json!({"messages": [{"role": "user", "content": [{"type": "something_new"}]}]});
        let messages = decode(&body).unwrap();
        assert!(messages[0].blocks.is_empty());
    }

    #[test]
    fn encode_round_trips_signed_thinking_byte_identical() {
        let messages = vec![CanonicalMessage::new(
            Role::Assistant,
            vec![Block::thinking_signed("T1", Signature::new("SIG1"))],
        )];
        let body = encode_upstream_body("claude-x", &messages);
        let decoded = decode(&body).unwrap();
        assert_eq!(decoded[0].blocks[0].thinking_signature().map(Signature::as_str), Some("SIG1"));
        assert_eq!(decoded[0].blocks[0].thinking_text(), Some("T1"));
    }

    #[test]
    fn encode_omits_signature_field_when_absent() {
        let messages = vec![CanonicalMessage::new(Role::Assistant, vec![Block::thinking("T1")])];
        let body = encode_upstream_body("claude-x", &messages);
        let block = &body["messages"][0]["content"][0];
        assert!(block.get("signature").is_none());
    }
}
