//! The content-block state machine (§4.D, §9 "Protocol translator as a
//! sum-typed state machine").
//!
//! `Translator` consumes the internal event alphabet (`TranslatorEvent`,
//! upstream's dialect per §6) and drives `States: Idle -> InThinking ->
//! SignedThinking -> InText -> InToolUse -> Done`, emitting a sequence of
//! format-agnostic [`DownstreamOp`]s. Per-format encoders (`anthropic`,
//! `openai`, `ndjson`) turn those into wire frames; this module never knows
//! about SSE or NDJSON syntax. Every `match` here is exhaustive — a new
//! `BlockKind` or `TranslatorEvent` variant is a compile error until handled,
//! per the REDESIGN FLAGS note against ad-hoc dict-shape branching.

use std::time::{SystemTime, UNIX_EPOCH};

use gateway_sigstore::SignatureStore;
use gateway_types::{
    BlockKind, BlockStartMeta, ClientKind, FingerprintKind, FinishReason, Signature,
    SignatureId, SignatureRecord, TranslatorEvent, fingerprint,
};

use crate::error::TranslateError;

/// One finalized or in-flight instruction for a downstream format encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownstreamOp {
    TextBlockStart,
    TextDelta(String),
    TextBlockStop,

    ThinkingBlockStart,
    ThinkingDelta(String),
    /// Emitted only for formats that can carry a signature (Anthropic).
    SignatureDelta(Signature),
    ThinkingBlockStop {
        text: String,
        signature: Option<Signature>,
    },

    ToolUseBlockStart {
        id: String,
        name: String,
    },
    ToolInputDelta(String),
    ToolUseBlockStop {
        id: String,
        name: String,
        /// Whitespace-free, parsed-then-reserialized JSON object.
        input_json: String,
    },

    MessageStop(FinishReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    InThinking,
    SignedThinking,
    InText,
    InToolUse,
    Done,
}

struct OpenTool {
    id: String,
    name: String,
    arg_buf: String,
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// One instance per upstream request (§5: "A translator instance is
/// single-producer ... and does not interleave blocks").
pub struct Translator<'a> {
    state: State,
    thinking_buf: String,
    thinking_signature: Option<Signature>,
    tool: Option<OpenTool>,
    client_kind: ClientKind,
    store: &'a SignatureStore,
    /// The most recently signed thinking record, kept open for one more
    /// block in case the next block is an adjacent `ToolUse` (§3.2 `tool_key`,
    /// §4.B layer 6: tool-use ids only become known to the fingerprint once
    /// the following block starts, so the record is re-keyed retroactively).
    pending_tool_link: Option<(SignatureId, String, Signature)>,
}

impl<'a> Translator<'a> {
    #[must_use]
    pub fn new(store: &'a SignatureStore, client_kind: ClientKind) -> Self {
        Self {
            state: State::Idle,
            thinking_buf: String::new(),
            thinking_signature: None,
            tool: None,
            client_kind,
            store,
            pending_tool_link: None,
        }
    }

    /// Feed one upstream event, producing zero or more downstream ops.
    pub fn apply(&mut self, event: TranslatorEvent) -> Result<Vec<DownstreamOp>, TranslateError> {
        match event {
            TranslatorEvent::BlockStart { kind, meta } => self.on_block_start(kind, meta),
            TranslatorEvent::TextDelta(s) => self.on_text_delta(s),
            TranslatorEvent::ThinkingDelta(s) => self.on_thinking_delta(s),
            TranslatorEvent::SignatureDelta(sig) => self.on_signature_delta(sig),
            TranslatorEvent::ToolInputDelta(partial) => self.on_tool_input_delta(partial),
            TranslatorEvent::BlockStop => self.on_block_stop(),
            TranslatorEvent::MessageStop(reason) => self.on_message_stop(reason),
        }
    }

    fn on_block_start(
        &mut self,
        kind: BlockKind,
        meta: BlockStartMeta,
    ) -> Result<Vec<DownstreamOp>, TranslateError> {
        if !matches!(self.state, State::Idle) {
            return Err(TranslateError::BlockAlreadyOpen);
        }

        // An adjacent ToolUse following a just-signed Thinking block widens
        // that record's keys with this tool's id/base id (§3.2, §4.B layer 6).
        if let (BlockKind::ToolUse, Some((sig_id, text, signature))) =
            (kind, self.pending_tool_link.take())
        {
            if let Some(tool_id) = meta.tool_id.clone() {
                self.link_tool_key(sig_id, &text, &signature, &tool_id);
            }
        } else {
            self.pending_tool_link = None;
        }

        match kind {
            BlockKind::Thinking => {
                self.state = State::InThinking;
                self.thinking_buf.clear();
                self.thinking_signature = None;
                Ok(vec![DownstreamOp::ThinkingBlockStart])
            }
            BlockKind::Text => {
                self.state = State::InText;
                Ok(vec![DownstreamOp::TextBlockStart])
            }
            BlockKind::ToolUse => {
                let id = meta.tool_id.unwrap_or_default();
                let name = meta.tool_name.unwrap_or_default();
                self.state = State::InToolUse;
                self.tool = Some(OpenTool { id: id.clone(), name: name.clone(), arg_buf: String::new() });
                Ok(vec![DownstreamOp::ToolUseBlockStart { id, name }])
            }
        }
    }

    fn on_text_delta(&mut self, text: String) -> Result<Vec<DownstreamOp>, TranslateError> {
        if !matches!(self.state, State::InText) {
            return Err(TranslateError::TextDeltaWithoutBlock);
        }
        Ok(vec![DownstreamOp::TextDelta(text)])
    }

    fn on_thinking_delta(&mut self, text: String) -> Result<Vec<DownstreamOp>, TranslateError> {
        if !matches!(self.state, State::InThinking) {
            return Err(TranslateError::ThinkingDeltaOutsideThinking);
        }
        self.thinking_buf.push_str(&text);
        Ok(vec![DownstreamOp::ThinkingDelta(text)])
    }

    fn on_signature_delta(&mut self, sig: Signature) -> Result<Vec<DownstreamOp>, TranslateError> {
        if !matches!(self.state, State::InThinking) {
            return Err(TranslateError::SignatureDeltaOutsideThinking);
        }
        self.state = State::SignedThinking;
        self.thinking_signature = Some(sig.clone());
        self.cache_signature(&sig);
        Ok(vec![DownstreamOp::SignatureDelta(sig)])
    }

    fn on_tool_input_delta(&mut self, partial: String) -> Result<Vec<DownstreamOp>, TranslateError> {
        if !matches!(self.state, State::InToolUse) {
            return Err(TranslateError::ToolInputDeltaOutsideToolUse);
        }
        let tool = self.tool.as_mut().expect("InToolUse implies tool is Some");
        tool.arg_buf.push_str(&partial);
        Ok(vec![DownstreamOp::ToolInputDelta(partial)])
    }

    fn on_block_stop(&mut self) -> Result<Vec<DownstreamOp>, TranslateError> {
        match self.state {
            State::InThinking | State::SignedThinking => {
                let text = std::mem::take(&mut self.thinking_buf);
                let signature = self.thinking_signature.take();
                self.state = State::Idle;
                Ok(vec![DownstreamOp::ThinkingBlockStop { text, signature }])
            }
            State::InText => {
                self.state = State::Idle;
                Ok(vec![DownstreamOp::TextBlockStop])
            }
            State::InToolUse => {
                let tool = self.tool.take().expect("InToolUse implies tool is Some");
                let input_json = canonicalize_json(&tool.arg_buf)
                    .map_err(|e| TranslateError::MalformedToolJson(e.to_string()))?;
                self.state = State::Idle;
                Ok(vec![DownstreamOp::ToolUseBlockStop {
                    id: tool.id,
                    name: tool.name,
                    input_json,
                }])
            }
            State::Idle | State::Done => Err(TranslateError::BlockStopWithoutBlock),
        }
    }

    fn on_message_stop(&mut self, reason: FinishReason) -> Result<Vec<DownstreamOp>, TranslateError> {
        self.state = State::Done;
        self.pending_tool_link = None;
        Ok(vec![DownstreamOp::MessageStop(reason)])
    }

    /// §4.D: "triggers a put to 4.A using all applicable fingerprints
    /// computed over the accumulated thinking text" the moment the
    /// signature arrives.
    fn cache_signature(&mut self, sig: &Signature) {
        let text = self.thinking_buf.clone();
        if text.is_empty() {
            return;
        }
        let now = now_secs();
        let id = self.store.next_id();
        let record = SignatureRecord {
            id,
            signature: sig.clone(),
            text: text.clone(),
            client_kind: self.client_kind,
            created_at: now,
            last_access: now,
        };
        let keys = vec![
            (FingerprintKind::Primary, fingerprint::primary_key(&text).to_string()),
            (FingerprintKind::Prefix, fingerprint::prefix_key(&text).to_string()),
            (FingerprintKind::Suffix, fingerprint::suffix_key(&text).to_string()),
            (FingerprintKind::LastNLines, fingerprint::last_n_lines_key(&text).to_string()),
        ];
        self.store.put(record, keys);
        self.pending_tool_link = Some((id, text, sig.clone()));
    }

    fn link_tool_key(&mut self, sig_id: SignatureId, text: &str, signature: &Signature, tool_id: &str) {
        let now = now_secs();
        let record = SignatureRecord {
            id: sig_id,
            signature: signature.clone(),
            text: text.to_string(),
            client_kind: self.client_kind,
            created_at: now,
            last_access: now,
        };
        let base = fingerprint::base_tool_id(tool_id);
        let mut keys = vec![(FingerprintKind::Tool, tool_id.to_string())];
        if base != tool_id {
            keys.push((FingerprintKind::Tool, base));
        }
        self.store.put(record, keys);
    }
}

/// Re-parses and re-serializes tool-call argument JSON, producing a
/// whitespace-free canonical form (§8 property 4). An empty accumulated
/// buffer canonicalizes to `{}` since upstream always sends a JSON object.
fn canonicalize_json(raw: &str) -> Result<String, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok("{}".to_string());
    }
    let value: serde_json::Value = serde_json::from_str(raw)?;
    serde_json::to_string(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SignatureStore {
        SignatureStore::open_in_memory(100).unwrap()
    }

    #[test]
    fn text_block_round_trips_through_state_machine() {
        let s = store();
        let mut t = Translator::new(&s, ClientKind::Generic);
        let ops1 = t.apply(TranslatorEvent::BlockStart {
            kind: BlockKind::Text,
            meta: BlockStartMeta::default(),
        }).unwrap();
        assert_eq!(ops1, vec![DownstreamOp::TextBlockStart]);
        let ops2 = t.apply(TranslatorEvent::TextDelta("hi".into())).unwrap();
        assert_eq!(ops2, vec![DownstreamOp::TextDelta("hi".into())]);
        let ops3 = t.apply(TranslatorEvent::BlockStop).unwrap();
        assert_eq!(ops3, vec![DownstreamOp::TextBlockStop]);
    }

    #[test]
    fn thinking_delta_outside_thinking_is_an_error() {
        let s = store();
        let mut t = Translator::new(&s, ClientKind::Generic);
        let err = t.apply(TranslatorEvent::ThinkingDelta("x".into())).unwrap_err();
        assert_eq!(err, TranslateError::ThinkingDeltaOutsideThinking);
    }

    #[test]
    fn block_start_while_block_open_errors() {
        let s = store();
        let mut t = Translator::new(&s, ClientKind::Generic);
        t.apply(TranslatorEvent::BlockStart { kind: BlockKind::Text, meta: BlockStartMeta::default() }).unwrap();
        let err = t.apply(TranslatorEvent::BlockStart { kind: BlockKind::Text, meta: BlockStartMeta::default() }).unwrap_err();
        assert_eq!(err, TranslateError::BlockAlreadyOpen);
    }

    #[test]
    fn signature_delta_caches_record_keyed_by_primary_fingerprint() {
        let s = store();
        let mut t = Translator::new(&s, ClientKind::Generic);
        t.apply(TranslatorEvent::BlockStart { kind: BlockKind::Thinking, meta: BlockStartMeta::default() }).unwrap();
        t.apply(TranslatorEvent::ThinkingDelta("Plan".into())).unwrap();
        t.apply(TranslatorEvent::SignatureDelta(Signature::new("SIG1"))).unwrap();
        let ops = t.apply(TranslatorEvent::BlockStop).unwrap();
        assert_eq!(
            ops,
            vec![DownstreamOp::ThinkingBlockStop { text: "Plan".into(), signature: Some(Signature::new("SIG1")) }]
        );

        let found = s.get_by(FingerprintKind::Primary, fingerprint::primary_key("Plan").as_str(), now_secs());
        assert_eq!(found.unwrap().signature, Signature::new("SIG1"));
    }

    #[test]
    fn tool_call_args_are_canonicalized_whitespace_free() {
        let s = store();
        let mut t = Translator::new(&s, ClientKind::Generic);
        t.apply(TranslatorEvent::BlockStart {
            kind: BlockKind::ToolUse,
            meta: BlockStartMeta { tool_id: Some("ls".into()), tool_name: Some("ls".into()) },
        }).unwrap();
        t.apply(TranslatorEvent::ToolInputDelta("{\"p\"".into())).unwrap();
        t.apply(TranslatorEvent::ToolInputDelta(":\"/\"}".into())).unwrap();
        let ops = t.apply(TranslatorEvent::BlockStop).unwrap();
        assert_eq!(
            ops,
            vec![DownstreamOp::ToolUseBlockStop {
                id: "ls".into(),
                name: "ls".into(),
                input_json: "{\"p\":\"/\"}".into(),
            }]
        );
    }

    #[test]
    fn adjacent_tool_use_links_tool_key_to_signed_thinking() {
        let s = store();
        let mut t = Translator::new(&s, ClientKind::Generic);
        t.apply(TranslatorEvent::BlockStart { kind: BlockKind::Thinking, meta: BlockStartMeta::default() }).unwrap();
        t.apply(TranslatorEvent::ThinkingDelta("use the tool".into())).unwrap();
        t.apply(TranslatorEvent::SignatureDelta(Signature::new("SIGX"))).unwrap();
        t.apply(TranslatorEvent::BlockStop).unwrap();
        t.apply(TranslatorEvent::BlockStart {
            kind: BlockKind::ToolUse,
            meta: BlockStartMeta { tool_id: Some("read_file_1".into()), tool_name: Some("read_file".into()) },
        }).unwrap();

        let found = s.get_by(FingerprintKind::Tool, "read_file_1", now_secs());
        assert_eq!(found.unwrap().signature, Signature::new("SIGX"));
    }
}
