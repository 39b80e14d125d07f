//! Signature and fingerprint types.
//!
//! A signature is opaque: bytes produced by upstream, round-tripped verbatim.
//! We never decode, re-encode, or otherwise transform it — only carry it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Opaque signature bytes bound to an exact thinking text.
///
/// Carried as the raw string upstream hands us. Never pass this through a
/// lossy or even lossless *re*-encoding (base64, percent-encoding, etc.) —
/// store and forward the bytes upstream gave us, unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for Signature {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A SHA-256 fingerprint of some projection of thinking text, hex-encoded.
///
/// Hex encoding here is a lossless, one-directional digest representation
/// (not a re-encoding of the signature itself) used purely as a lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    #[must_use]
    pub fn from_sha256_hex(hex: String) -> Self {
        Self(hex)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which of the six index tables a fingerprint belongs to.
///
/// `Primary` corresponds to the `by_text` table in the persistence schema;
/// the variant is named for what it indexes, matching its role in recovery
/// (4.B layer 1) rather than its storage table name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FingerprintKind {
    Primary,
    Prefix,
    Suffix,
    LastNLines,
    Session,
    Tool,
}

impl FingerprintKind {
    /// The name of the durable-tier index table for this kind.
    #[must_use]
    pub fn table_name(self) -> &'static str {
        match self {
            Self::Primary => "by_text",
            Self::Prefix => "by_prefix",
            Self::Suffix => "by_suffix",
            Self::LastNLines => "by_last_n",
            Self::Session => "by_session",
            Self::Tool => "by_tool",
        }
    }
}

/// The IDE/plugin fingerprint inferred from inbound request headers.
///
/// Determines TTL (§3.2) and whether missing signatures are dropped or kept
/// as unsignable text (§4.C) when recovery fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    #[default]
    Generic,
    Cursor,
    Windsurf,
    Augment,
}

impl ClientKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::Cursor => "cursor",
            Self::Windsurf => "windsurf",
            Self::Augment => "augment",
        }
    }

    /// A client known to strip signatures from history it replays (§4.C).
    #[must_use]
    pub fn strips_signatures(self) -> bool {
        matches!(self, Self::Cursor | Self::Windsurf)
    }

    /// Default TTL for cached signatures observed from this client kind (§3.2).
    /// Overridable per-client via `SIGCACHE_TTL_<CLIENT>`.
    #[must_use]
    pub fn default_ttl(self) -> Duration {
        match self {
            Self::Cursor | Self::Windsurf => Duration::from_secs(2 * 60 * 60),
            Self::Generic | Self::Augment => Duration::from_secs(30 * 60),
        }
    }

    /// Infer client kind from the `X-Hijack` header value, falling back to
    /// user-agent substring sniffing, per §4.C.
    #[must_use]
    pub fn from_hijack_header(value: Option<&str>, user_agent: Option<&str>) -> Self {
        if let Some(v) = value {
            match v.to_ascii_lowercase().as_str() {
                "cursor" => return Self::Cursor,
                "windsurf" => return Self::Windsurf,
                "augment" => return Self::Augment,
                _ => {}
            }
        }
        let ua = user_agent.unwrap_or_default().to_ascii_lowercase();
        if ua.contains("cursor") {
            Self::Cursor
        } else if ua.contains("windsurf") {
            Self::Windsurf
        } else if ua.contains("augment") {
            Self::Augment
        } else {
            Self::Generic
        }
    }
}

/// A row in the Signature Store (§3.2): the value half of every index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub id: crate::ids::SignatureId,
    pub signature: Signature,
    pub text: String,
    pub client_kind: ClientKind,
    pub created_at: u64,
    pub last_access: u64,
}

impl SignatureRecord {
    #[must_use]
    pub fn is_within_ttl(&self, now: u64, ttl: Duration) -> bool {
        now.saturating_sub(self.created_at) <= ttl.as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_signatures_only_cursor_and_windsurf() {
        assert!(ClientKind::Cursor.strips_signatures());
        assert!(ClientKind::Windsurf.strips_signatures());
        assert!(!ClientKind::Generic.strips_signatures());
        assert!(!ClientKind::Augment.strips_signatures());
    }

    #[test]
    fn ttl_matches_spec_table() {
        assert_eq!(ClientKind::Generic.default_ttl(), Duration::from_secs(1800));
        assert_eq!(ClientKind::Cursor.default_ttl(), Duration::from_secs(7200));
        assert_eq!(ClientKind::Windsurf.default_ttl(), Duration::from_secs(7200));
    }

    #[test]
    fn hijack_header_takes_precedence_over_user_agent() {
        let kind = ClientKind::from_hijack_header(Some("cursor"), Some("windsurf-agent/1.0"));
        assert_eq!(kind, ClientKind::Cursor);
    }

    #[test]
    fn falls_back_to_user_agent_sniffing() {
        let kind = ClientKind::from_hijack_header(None, Some("Windsurf/3.2 (ide)"));
        assert_eq!(kind, ClientKind::Windsurf);
    }

    #[test]
    fn unknown_header_defaults_to_generic() {
        let kind = ClientKind::from_hijack_header(Some("something-else"), None);
        assert_eq!(kind, ClientKind::Generic);
    }
}
