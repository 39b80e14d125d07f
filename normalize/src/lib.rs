//! Message Normalizer (§4.C): decode inbound request bodies across the
//! three wire dialects into canonical messages, recover missing thinking
//! signatures, and validate tool-use/tool-result pairing.

pub mod anthropic;
pub mod error;
pub mod ndjson;
pub mod openai;
pub mod tool_chain;

use gateway_recovery::{recover, RecoveryContext};
use gateway_sigstore::SignatureStore;
use gateway_types::{ApiDialect, Block, CanonicalMessage, ClientKind, Role};

pub use anthropic::encode_upstream_body;
pub use error::NormalizeError;

/// Everything the normalizer needs to decode one inbound request.
pub struct NormalizeInput<'a> {
    pub dialect: ApiDialect,
    pub body: &'a serde_json::Value,
    pub hijack_header: Option<&'a str>,
    pub user_agent: Option<&'a str>,
}

pub struct NormalizeOutput {
    pub messages: Vec<CanonicalMessage>,
    pub client_kind: ClientKind,
}

/// Decodes, recovers, and validates one inbound request (§4.C steps, in
/// order): dialect-specific decode, per-assistant-message signature
/// recovery for unsigned `Thinking` blocks, then tool-chain validation.
pub fn normalize(
    store: &SignatureStore,
    input: &NormalizeInput<'_>,
    now: u64,
) -> Result<NormalizeOutput, NormalizeError> {
    let client_kind = ClientKind::from_hijack_header(input.hijack_header, input.user_agent);

    let mut messages = match input.dialect {
        ApiDialect::Anthropic => anthropic::decode(input.body)?,
        ApiDialect::OpenAi => openai::decode(input.body)?,
        ApiDialect::Ndjson => ndjson::decode(input.body)?,
    };

    recover_missing_signatures(store, &mut messages, client_kind, now);

    let messages = tool_chain::validate_and_repair(messages)?;

    Ok(NormalizeOutput { messages, client_kind })
}

fn recover_missing_signatures(
    store: &SignatureStore,
    messages: &mut [CanonicalMessage],
    client_kind: ClientKind,
    now: u64,
) {
    let mut user_texts: Vec<String> = Vec::new();
    for i in 0..messages.len() {
        if messages[i].role == Role::User {
            user_texts.push(messages[i].concatenated_text());
        }
        if messages[i].role != Role::Assistant {
            continue;
        }
        let recovered = recover_message_blocks(store, &messages[i], client_kind, &user_texts, now);
        messages[i].blocks = recovered;
    }
}

/// Recovers signatures for every unsigned `Thinking` block in `message`.
/// On a recovery miss: drops the block for clients known to strip
/// signatures (`cursor`, `windsurf`); otherwise downgrades it to plain
/// text, per §4.C.
fn recover_message_blocks(
    store: &SignatureStore,
    message: &CanonicalMessage,
    client_kind: ClientKind,
    user_texts: &[String],
    now: u64,
) -> Vec<Block> {
    let user_text_refs: Vec<&str> = user_texts.iter().map(String::as_str).collect();
    let mut out = Vec::with_capacity(message.blocks.len());

    for (i, block) in message.blocks.iter().enumerate() {
        match block {
            Block::Thinking { text, signature: None, .. } => {
                let adjacent_tool_use_id = message.blocks.get(i + 1).and_then(|b| match b {
                    Block::ToolUse { id, .. } => Some(id.as_str()),
                    _ => None,
                });
                let ctx = RecoveryContext {
                    user_texts: &user_text_refs,
                    adjacent_tool_use_id,
                };
                match recover(store, text, client_kind, &ctx, now) {
                    Some(outcome) => out.push(block.clone().with_recovered_signature(outcome.record.signature)),
                    None if client_kind.strips_signatures() => {}
                    None => out.push(Block::text(text.clone())),
                }
            }
            other => out.push(other.clone()),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_types::{Fingerprint, FingerprintKind, Signature, SignatureId, SignatureRecord};
    use serde_json::json;

    fn store_with_seed(text: &str, sig: &str) -> SignatureStore {
        let store = SignatureStore::open_in_memory(100).unwrap();
        let record = SignatureRecord {
            id: SignatureId::new(1),
            signature: Signature::new(sig),
            text: text.to_string(),
            client_kind: ClientKind::Generic,
            created_at: 1000,
            last_access: 1000,
        };
        let key: Fingerprint = gateway_types::fingerprint::primary_key(text);
        store.put(record, vec![(FingerprintKind::Primary, key.to_string())]);
        store
    }

    #[test]
    fn recovers_signature_for_cursor_history_and_keeps_thinking_block() {
        let store = store_with_seed("Hmm, let me check...", "SIG_CACHED");
        let body = json!({"messages": [{"role": "assistant", "content": [
            {"type": "thinking", "thinking": "Hmm, let me check..."}
        ]}]});
        let input = NormalizeInput {
            dialect: ApiDialect::Anthropic,
            body: &body,
            hijack_header: Some("cursor"),
            user_agent: None,
        };
        let output = normalize(&store, &input, 1000).unwrap();
        assert_eq!(output.client_kind, ClientKind::Cursor);
        let block = &output.messages[0].blocks[0];
        assert_eq!(block.thinking_signature().map(Signature::as_str), Some("SIG_CACHED"));
    }

    #[test]
    fn strips_unrecoverable_thinking_for_cursor_client() {
        let store = SignatureStore::open_in_memory(100).unwrap();
        let body = json!({"messages": [{"role": "assistant", "content": [
            {"type": "thinking", "thinking": "never cached"}
        ]}]});
        let input = NormalizeInput {
            dialect: ApiDialect::Anthropic,
            body: &body,
            hijack_header: Some("cursor"),
            user_agent: None,
        };
        let output = normalize(&store, &input, 1000).unwrap();
        assert!(output.messages[0].blocks.is_empty());
    }

    #[test]
    fn downgrades_unrecoverable_thinking_to_text_for_generic_client() {
        let store = SignatureStore::open_in_memory(100).unwrap();
        let body = json!({"messages": [{"role": "assistant", "content": [
            {"type": "thinking", "thinking": "never cached"}
        ]}]});
        let input = NormalizeInput {
            dialect: ApiDialect::Anthropic,
            body: &body,
            hijack_header: None,
            user_agent: None,
        };
        let output = normalize(&store, &input, 1000).unwrap();
        assert!(matches!(output.messages[0].blocks[0], Block::Text { .. }));
    }

    #[test]
    fn rejects_orphaned_tool_result_alongside_other_content() {
        let store = SignatureStore::open_in_memory(100).unwrap();
        let body = json!({"messages": [
            {"role": "user", "content": "hi"},
            {"role": "tool", "content": [{"type": "tool_result", "tool_use_id": "missing", "content": "ok"}]},
        ]});
        let input = NormalizeInput {
            dialect: ApiDialect::Anthropic,
            body: &body,
            hijack_header: None,
            user_agent: None,
        };
        let err = normalize(&store, &input, 1000).unwrap_err();
        assert!(matches!(err, NormalizeError::MalformedToolChain { .. }));
    }
}
