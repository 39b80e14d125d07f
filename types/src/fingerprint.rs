//! Fingerprint derivation (§3.2).
//!
//! Pure functions over text; no IO. The Signature Store and Recovery Engine
//! both derive keys this way so a record written under one fingerprint is
//! always found under the same fingerprint computed later from equivalent
//! input.

use sha2::{Digest, Sha256};

use crate::signature::Fingerprint;

fn sha256_hex(input: &str) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    Fingerprint::from_sha256_hex(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// `primary_key` — SHA-256 of the full thinking text.
#[must_use]
pub fn primary_key(text: &str) -> Fingerprint {
    sha256_hex(text)
}

/// `prefix_key` — SHA-256 of the first 256 chars.
#[must_use]
pub fn prefix_key(text: &str) -> Fingerprint {
    let prefix: String = text.chars().take(256).collect();
    sha256_hex(&prefix)
}

/// `suffix_key` — SHA-256 of the last 256 chars.
#[must_use]
pub fn suffix_key(text: &str) -> Fingerprint {
    let chars: Vec<char> = text.chars().collect();
    let start = chars.len().saturating_sub(256);
    let suffix: String = chars[start..].iter().collect();
    sha256_hex(&suffix)
}

/// `last_n_lines_key` — SHA-256 of the last 5 lines.
#[must_use]
pub fn last_n_lines_key(text: &str) -> Fingerprint {
    last_n_lines_key_n(text, 5)
}

#[must_use]
pub fn last_n_lines_key_n(text: &str, n: usize) -> Fingerprint {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    sha256_hex(&lines[start..].join("\n"))
}

/// `session_key` — SHA-256 of the concatenation of the last `count` user
/// message texts in the request, in chronological order.
#[must_use]
pub fn session_key(user_texts_newest_last: &[&str], count: usize) -> Fingerprint {
    let start = user_texts_newest_last.len().saturating_sub(count);
    sha256_hex(&user_texts_newest_last[start..].concat())
}

/// All session-key candidates for recovery layer 5 (§4.B): last 3, then 2,
/// then 1, most-specific first.
#[must_use]
pub fn session_key_candidates(user_texts_newest_last: &[&str]) -> Vec<Fingerprint> {
    [3usize, 2, 1]
        .into_iter()
        .filter(|&n| n <= user_texts_newest_last.len())
        .map(|n| session_key(user_texts_newest_last, n))
        .collect()
}

/// Strip a trailing `_<digits>` or `-<digits>` suffix from a tool-use id to
/// derive its `base_tool_id` (§3.2, used by recovery layer 6).
#[must_use]
pub fn base_tool_id(tool_use_id: &str) -> String {
    let bytes = tool_use_id.as_bytes();
    let mut end = bytes.len();
    let mut i = bytes.len();
    while i > 0 && bytes[i - 1].is_ascii_digit() {
        i -= 1;
    }
    if i < end && i > 0 && (bytes[i - 1] == b'_' || bytes[i - 1] == b'-') && i - 1 < end {
        end = i - 1;
        return tool_use_id[..end].to_string();
    }
    tool_use_id.to_string()
}
