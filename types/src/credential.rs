//! Credential and backoff schedule types (§3.4, §3.5).

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default backoff level cap; overridable via `CREDENTIAL_MAX_BACKOFF_LEVEL`.
pub const DEFAULT_MAX_BACKOFF_LEVEL: u32 = 5;

/// Wait duration for a given backoff level, per the fixed schedule in §3.5:
/// 0→0s, 1→30s, 2→2m, 3→10m, 4→1h, 5+→6h (capped).
#[must_use]
pub fn wait_for_level(level: u32) -> Duration {
    match level {
        0 => Duration::from_secs(0),
        1 => Duration::from_secs(30),
        2 => Duration::from_secs(2 * 60),
        3 => Duration::from_secs(10 * 60),
        4 => Duration::from_secs(60 * 60),
        _ => Duration::from_secs(6 * 60 * 60),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    Antigravity,
    Geminicli,
}

impl CredentialKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Antigravity => "antigravity",
            Self::Geminicli => "geminicli",
        }
    }
}

/// Per-(credential, model) cooldown state.
///
/// Invariant: `cooldown_until >= last_updated`; `backoff_level` never
/// decreases during a streak of failures and resets to 0 only on a success
/// observed after `cooldown_until` has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CooldownEntry {
    pub cooldown_until: u64,
    pub backoff_level: u32,
    pub last_updated: u64,
}

impl CooldownEntry {
    #[must_use]
    pub fn is_eligible(&self, now: u64) -> bool {
        self.cooldown_until <= now
    }

    /// Apply a rate-limit observation: bump the level (capped) and set the
    /// new cooldown deadline from the schedule.
    #[must_use]
    pub fn on_rate_limited(self, now: u64, max_level: u32) -> Self {
        let backoff_level = (self.backoff_level + 1).min(max_level);
        Self {
            cooldown_until: now + wait_for_level(backoff_level).as_secs(),
            backoff_level,
            last_updated: now,
        }
    }

    #[must_use]
    pub fn on_success(self, now: u64) -> Self {
        Self {
            cooldown_until: 0,
            backoff_level: 0,
            last_updated: now,
        }
    }
}

/// A single credential (OAuth token file / key) and its per-model cooldowns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    pub kind: CredentialKind,
    pub disabled: bool,
    pub model_cooldowns: HashMap<String, CooldownEntry>,
}

impl Credential {
    #[must_use]
    pub fn new(id: impl Into<String>, kind: CredentialKind) -> Self {
        Self {
            id: id.into(),
            kind,
            disabled: false,
            model_cooldowns: HashMap::new(),
        }
    }

    #[must_use]
    pub fn cooldown_for(&self, model: &str) -> CooldownEntry {
        self.model_cooldowns.get(model).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn is_eligible_for(&self, model: &str, now: u64) -> bool {
        !self.disabled && self.cooldown_for(model).is_eligible(now)
    }
}

/// Observability snapshot of one credential, for the admin endpoint (§6,
/// `[SUPPLEMENT] Observability endpoint detail`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialStatus {
    pub id: String,
    pub kind: CredentialKind,
    pub disabled: bool,
    pub models: HashMap<String, ModelCooldownStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCooldownStatus {
    pub cooldown_until: u64,
    pub backoff_level: u32,
    pub seconds_remaining: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_schedule_matches_spec_table() {
        assert_eq!(wait_for_level(0), Duration::from_secs(0));
        assert_eq!(wait_for_level(1), Duration::from_secs(30));
        assert_eq!(wait_for_level(2), Duration::from_secs(120));
        assert_eq!(wait_for_level(3), Duration::from_secs(600));
        assert_eq!(wait_for_level(4), Duration::from_secs(3600));
        assert_eq!(wait_for_level(5), Duration::from_secs(21600));
        assert_eq!(wait_for_level(9), Duration::from_secs(21600));
    }

    #[test]
    fn on_rate_limited_bumps_level_and_caps() {
        let mut entry = CooldownEntry::default();
        for _ in 0..10 {
            entry = entry.on_rate_limited(1000, 5);
        }
        assert_eq!(entry.backoff_level, 5);
        assert_eq!(entry.cooldown_until, 1000 + 21600);
    }

    #[test]
    fn on_success_resets_level_and_cooldown() {
        let entry = CooldownEntry {
            cooldown_until: 500,
            backoff_level: 3,
            last_updated: 400,
        }
        .on_success(600);
        assert_eq!(entry.backoff_level, 0);
        assert_eq!(entry.cooldown_until, 0);
    }

    #[test]
    fn eligibility_respects_cooldown_deadline() {
        let entry = CooldownEntry {
            cooldown_until: 1000,
            backoff_level: 1,
            last_updated: 970,
        };
        assert!(!entry.is_eligible(999));
        assert!(entry.is_eligible(1000));
        assert!(entry.is_eligible(1001));
    }
}
