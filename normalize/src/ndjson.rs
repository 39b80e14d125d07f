//! Decodes inbound vendor NDJSON `/gateway/chat-stream` request bodies
//! (§4.C, §6) into canonical messages.
//!
//! The vendor request body mirrors the node vocabulary the translator's
//! own NDJSON encoder (`gateway_translate::ndjson`) emits on output: each
//! message carries a `nodes` array of `{type, data}` objects, `type` 0/5/6
//! for text/tool_use/thinking respectively (§4.D output table, §8 S5).

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
    nodes: Vec<WireNode>,
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
struct WireNode {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    data: serde_json::Value,
}

pub fn decode(body: &serde_json::Value) -> Result<Vec<CanonicalMessage>, NormalizeError> {
    let parsed: RequestBody = serde_json::from_value(body.clone())?;
    Ok(parsed.messages.into_iter().map(convert_message).collect())
}

fn convert_message(msg: WireMessage) -> CanonicalMessage {
    let blocks = msg.nodes.into_iter().filter_map(convert_node).collect();
    CanonicalMessage::new(msg.role.into(), blocks)
}

fn convert_node(node: WireNode) -> Option<Block> {
    match node.kind {
        0 => {
            let text = node.data.get("text")?.as_str()?.to_string();
            Some(Block::text(text))
        }
        6 => {
            let text = node.data.get("thinking")?.as_str().unwrap_or_default().to_string();
            let signature = node
                .data
                .get("signature")
                .and_then(serde_json::Value::as_str)
                .map(gateway_types::Signature::new);
            Some(Block::Thinking { text, signature, redacted: false })
        }
        5 => {
            let tool_use = node.data.get("tool_use")?;
            let id = tool_use.get("id")?.as_str()?;
            let name = tool_use.get("name")?.as_str()?;
            let input_json = tool_use.get("input").cloned().unwrap_or(serde_json::Value::Null);
            let id = gateway_types::NonEmptyString::new(id).ok()?;
            let name = gateway_types::NonEmptyString::new(name).ok()?;
            Some(Block::ToolUse { id, name, input_json })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_text_node() {
        let body = json!({"messages": [{"role": "user", "nodes": [{"type": 0, "data": {"text": "hi"}}]}]});
        let messages = decode(&body).unwrap();
        assert_eq!(messages[0].concatenated_text(), "hi");
    }

    #[test]
    fn decodes_thinking_node_with_signature() {
        let body = json!({"messages": [{"role": "assistant", "nodes": [
            {"type": 6, "data": {"thinking": "Plan", "signature": "S"}}
        ]}]});
        let messages = decode(&body).unwrap();
        assert_eq!(messages[0].blocks[0].thinking_signature().map(gateway_types::Signature::as_str), Some("S"));
    }

    #[test]
    fn decodes_tool_use_node() {
        let body = json!({"messages": [{"role": "assistant", "nodes": [
            {"type": 5, "data": {"tool_use": {"id": "t1", "name": "ls", "input": {"p": "/"}}}}
        ]}]});
        let messages = decode(&body).unwrap();
        assert!(matches!(messages[0].blocks[0], Block::ToolUse { .. }));
    }

    #[test]
    fn unknown_node_types_are_skipped() {
        let body = json!({"messages": [{"role": "user", "nodes": [{"type": 99, "data": {}}]}]});
        let messages = decode(&body).unwrap();
        assert!(messages[0].blocks.is_empty());
    }
}
