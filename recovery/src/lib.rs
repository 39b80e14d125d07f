//! Signature Recovery Engine (§4.B).
//!
//! Ordered fallback over the Signature Store; the first layer to hit wins.
//! Never errors — a total miss is policy ("drop the thinking block"), not a
//! failure, mirrored here by returning `None` rather than `Result`. No
//! direct teacher analogue exists for this exact ladder; grounded on the
//! store's `get_by`/`recent_within` contract (`sigstore::store::SignatureStore`)
//! and on the layer ordering specified in §4.B.

use gateway_sigstore::SignatureStore;
use gateway_types::{fingerprint, ClientKind, FingerprintKind, SignatureRecord};
use tracing::debug;

/// Which layer produced a hit, for logging (fingerprint prefix only, never
/// the signature bytes — per §4.B's own logging rule).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryLayer {
    ExactText,
    Prefix,
    Suffix,
    LastNLines,
    Session,
    ToolFuzzy,
    TimeWindow,
}

impl RecoveryLayer {
    fn label(self) -> &'static str {
        match self {
            Self::ExactText => "exact_text",
            Self::Prefix => "prefix",
            Self::Suffix => "suffix",
            Self::LastNLines => "last_n_lines",
            Self::Session => "session",
            Self::ToolFuzzy => "tool_fuzzy",
            Self::TimeWindow => "time_window",
        }
    }
}

pub struct RecoveryOutcome {
    pub record: SignatureRecord,
    pub layer: RecoveryLayer,
}

/// Optional context narrowing later recovery layers: the thinking block's
/// request-local neighbors.
#[derive(Debug, Default, Clone)]
pub struct RecoveryContext<'a> {
    /// Last user message texts in the current request, oldest first.
    pub user_texts: &'a [&'a str],
    /// Id of the `ToolUse` block adjacent to this thinking block, if any.
    pub adjacent_tool_use_id: Option<&'a str>,
}

const TIME_WINDOW_SECONDS: u64 = 300;

/// Attempt recovery for a thinking block's `text`, trying each layer of
/// §4.B in order. Returns `None` only if every layer misses.
pub fn recover(
    store: &SignatureStore,
    text: &str,
    client_kind: ClientKind,
    context: &RecoveryContext<'_>,
    now: u64,
) -> Option<RecoveryOutcome> {
    let _ = client_kind; // TTL gating happens inside the store; time-window fallback
                         // is applied uniformly across client kinds, not gated off
                         // for signature-strict clients.

    if let Some(record) = store.get_by(FingerprintKind::Primary, fingerprint::primary_key(text).as_str(), now) {
        return hit(record, RecoveryLayer::ExactText, text);
    }
    if let Some(record) = store.get_by(FingerprintKind::Prefix, fingerprint::prefix_key(text).as_str(), now) {
        return hit(record, RecoveryLayer::Prefix, text);
    }
    if let Some(record) = store.get_by(FingerprintKind::Suffix, fingerprint::suffix_key(text).as_str(), now) {
        return hit(record, RecoveryLayer::Suffix, text);
    }
    if let Some(record) = store.get_by(FingerprintKind::LastNLines, fingerprint::last_n_lines_key(text).as_str(), now) {
        return hit(record, RecoveryLayer::LastNLines, text);
    }

    for candidate in fingerprint::session_key_candidates(context.user_texts) {
        if let Some(record) = store.get_by(FingerprintKind::Session, candidate.as_str(), now) {
            return hit(record, RecoveryLayer::Session, text);
        }
    }

    if let Some(tool_id) = context.adjacent_tool_use_id {
        if let Some(record) = store.get_by(FingerprintKind::Tool, tool_id, now) {
            return hit(record, RecoveryLayer::ToolFuzzy, text);
        }
        let base = fingerprint::base_tool_id(tool_id);
        if let Some(record) = store.get_by(FingerprintKind::Tool, &base, now) {
            return hit(record, RecoveryLayer::ToolFuzzy, text);
        }
    }

    if let Some(record) = store.recent_within(now, TIME_WINDOW_SECONDS) {
        return hit(record, RecoveryLayer::TimeWindow, text);
    }

    debug!(
        fingerprint_prefix = %short_prefix(&fingerprint::primary_key(text).to_string()),
        "signature recovery exhausted all layers"
    );
    None
}

fn hit(record: SignatureRecord, layer: RecoveryLayer, text: &str) -> Option<RecoveryOutcome> {
    debug!(
        layer = layer.label(),
        fingerprint_prefix = %short_prefix(&fingerprint::primary_key(text).to_string()),
        "signature recovered"
    );
    Some(RecoveryOutcome { record, layer })
}

fn short_prefix(s: &str) -> String {
    s.chars().take(12).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_sigstore::SignatureStore;
    use gateway_types::{ClientKind, Signature, SignatureId};

    fn seed(store: &SignatureStore, id: i64, text: &str, sig: &str, created_at: u64) {
        let record = SignatureRecord {
            id: SignatureId::new(id),
            signature: Signature::new(sig),
            text: text.to_string(),
            client_kind: ClientKind::Generic,
            created_at,
            last_access: created_at,
        };
        store.put(
            record,
            vec![(FingerprintKind::Primary, fingerprint::primary_key(text).to_string())],
        );
    }

    #[test]
    fn exact_text_layer_wins_first() {
        let store = SignatureStore::open_in_memory(100).unwrap();
        seed(&store, 1, "Hmm, let me check...", "SIG_CACHED", 1000);

        let outcome = recover(
            &store,
            "Hmm, let me check...",
            ClientKind::Cursor,
            &RecoveryContext::default(),
            1000,
        )
        .unwrap();
        assert_eq!(outcome.layer, RecoveryLayer::ExactText);
        assert_eq!(outcome.record.signature.as_str(), "SIG_CACHED");
    }

    #[test]
    fn tool_fuzzy_falls_back_to_base_id_and_prefers_newest() {
        let store = SignatureStore::open_in_memory(100).unwrap();
        let older = SignatureRecord {
            id: SignatureId::new(1),
            signature: Signature::new("SIG_A"),
            text: "plan a".to_string(),
            client_kind: ClientKind::Generic,
            created_at: 100,
            last_access: 100,
        };
        store.put(older, vec![(FingerprintKind::Tool, "read_file_42".to_string()), (FingerprintKind::Tool, "read_file".to_string())]);
        let newer = SignatureRecord {
            id: SignatureId::new(2),
            signature: Signature::new("SIG_B"),
            text: "plan b".to_string(),
            client_kind: ClientKind::Generic,
            created_at: 200,
            last_access: 200,
        };
        store.put(newer, vec![(FingerprintKind::Tool, "read_file".to_string())]);

        let ctx = RecoveryContext {
            user_texts: &[],
            adjacent_tool_use_id: Some("read_file_99"),
        };
        let outcome = recover(&store, "unrelated thinking text", ClientKind::Generic, &ctx, 1000).unwrap();
        assert_eq!(outcome.layer, RecoveryLayer::ToolFuzzy);
        assert_eq!(outcome.record.signature.as_str(), "SIG_B");
    }

    /// Same as above but with the newer record written *first*: the newest
    /// by `created_at` must still win, proving selection isn't just "last
    /// write wins" under the hood.
    #[test]
    fn tool_fuzzy_prefers_newest_by_created_at_regardless_of_write_order() {
        let store = SignatureStore::open_in_memory(100).unwrap();
        let newer = SignatureRecord {
            id: SignatureId::new(1),
            signature: Signature::new("SIG_B"),
            text: "plan b".to_string(),
            client_kind: ClientKind::Generic,
            created_at: 200,
            last_access: 200,
        };
        store.put(newer, vec![(FingerprintKind::Tool, "read_file".to_string())]);
        let older = SignatureRecord {
            id: SignatureId::new(2),
            signature: Signature::new("SIG_A"),
            text: "plan a".to_string(),
            client_kind: ClientKind::Generic,
            created_at: 100,
            last_access: 100,
        };
        store.put(older, vec![(FingerprintKind::Tool, "read_file_42".to_string()), (FingerprintKind::Tool, "read_file".to_string())]);

        let ctx = RecoveryContext {
            user_texts: &[],
            adjacent_tool_use_id: Some("read_file_99"),
        };
        let outcome = recover(&store, "unrelated thinking text", ClientKind::Generic, &ctx, 1000).unwrap();
        assert_eq!(outcome.layer, RecoveryLayer::ToolFuzzy);
        assert_eq!(outcome.record.signature.as_str(), "SIG_B");
    }

    #[test]
    fn time_window_fallback_is_last_resort() {
        let store = SignatureStore::open_in_memory(100).unwrap();
        seed(&store, 1, "some other text entirely", "SIG_RECENT", 995);

        let outcome = recover(
            &store,
            "completely unrelated text",
            ClientKind::Generic,
            &RecoveryContext::default(),
            1000,
        )
        .unwrap();
        assert_eq!(outcome.layer, RecoveryLayer::TimeWindow);
    }

    #[test]
    fn every_layer_miss_returns_none_without_erroring() {
        let store = SignatureStore::open_in_memory(100).unwrap();
        let outcome = recover(&store, "never seen", ClientKind::Generic, &RecoveryContext::default(), 1000);
        assert!(outcome.is_none());
    }
}
