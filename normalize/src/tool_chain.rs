//! Tool-use / tool-result pairing validation and repair (§4.C).
//!
//! Every `ToolResult.tool_use_id` must name an earlier `ToolUse.id` in the
//! same request. A request whose only content is an orphaned `ToolResult`
//! (no `ToolUse` anywhere earlier to match it) is repaired by synthesizing
//! a minimal placeholder `ToolUse`; any other orphan is rejected.

use std::collections::HashSet;

use gateway_types::{Block, CanonicalMessage, NonEmptyString, Role};

use crate::error::NormalizeError;

/// Validates tool-use/tool-result pairing across an entire request's
/// messages. If the request's only content is a single orphaned
/// `ToolResult`, a placeholder `ToolUse` message is inserted ahead of it so
/// the pair is well-formed; any other orphan is rejected.
pub fn validate_and_repair(messages: Vec<CanonicalMessage>) -> Result<Vec<CanonicalMessage>, NormalizeError> {
    let mut seen_tool_use_ids: HashSet<String> = HashSet::new();
    for message in &messages {
        for block in &message.blocks {
            if let Block::ToolUse { id, .. } = block {
                seen_tool_use_ids.insert(id.as_str().to_string());
            }
        }
    }

    let total_blocks: usize = messages.iter().map(|m| m.blocks.len()).sum();

    for message in &messages {
        for block in &message.blocks {
            let Block::ToolResult { tool_use_id, .. } = block else {
                continue;
            };
            if seen_tool_use_ids.contains(tool_use_id.as_str()) {
                continue;
            }
            if total_blocks == 1 {
                let placeholder = CanonicalMessage::new(
                    Role::Assistant,
                    vec![Block::ToolUse {
                        id: tool_use_id.clone(),
                        name: NonEmptyString::new("unknown").expect("non-empty literal"),
                        input_json: serde_json::Value::Null,
                    }],
                );
                let mut repaired = Vec::with_capacity(messages.len() + 1);
                repaired.push(placeholder);
                repaired.extend(messages);
                return Ok(repaired);
            }
            return Err(NormalizeError::MalformedToolChain {
                tool_use_id: tool_use_id.as_str().to_string(),
            });
        }
    }

    Ok(messages)
}
