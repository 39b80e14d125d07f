//! Gateway configuration (§6): environment-level settings resolved once.
//!
//! A single immutable `GatewayConfig`, resolved once at startup with every
//! default applied — nothing downstream reads an `Option<T>` config field
//! ad hoc. Configuration is env-var only; there is no settings file.

mod env;

use std::collections::HashMap;
use std::time::Duration;

use gateway_types::ClientKind;

pub use env::RawEnv;

const DEFAULT_HOT_CAPACITY: usize = 10_000;
const DEFAULT_DB_PATH: &str = "gateway-signatures.db";
const DEFAULT_MAX_BACKOFF_LEVEL: u32 = 5;
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 10 * 60;
const DEFAULT_UPSTREAM_IDLE_TIMEOUT_SECONDS: u64 = 120;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub sigcache_max_entries: usize,
    pub sigcache_db_path: String,
    pub sigcache_ttl_overrides: HashMap<ClientKind, Duration>,
    pub credential_max_backoff_level: u32,
    pub request_timeout: Duration,
    pub upstream_idle_timeout: Duration,
    pub admin_password: Option<String>,
}

impl GatewayConfig {
    /// Gathers from the process environment and resolves defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_raw(RawEnv::gather())
    }

    #[must_use]
    pub fn from_raw(raw: RawEnv) -> Self {
        let sigcache_max_entries = raw
            .sigcache_max_entries
            .as_deref()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_HOT_CAPACITY);

        let sigcache_db_path = raw
            .sigcache_db_path
            .unwrap_or_else(|| DEFAULT_DB_PATH.to_string());

        let sigcache_ttl_overrides = raw
            .sigcache_ttl_overrides
            .into_iter()
            .filter_map(|(kind, value)| {
                value.parse::<u64>().ok().map(|secs| (kind, Duration::from_secs(secs)))
            })
            .collect();

        let credential_max_backoff_level = raw
            .credential_max_backoff_level
            .as_deref()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_BACKOFF_LEVEL);

        let request_timeout = raw
            .request_timeout_seconds
            .as_deref()
            .and_then(|s| s.parse::<u64>().ok())
            .map_or(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECONDS), Duration::from_secs);

        let upstream_idle_timeout = raw
            .upstream_idle_timeout_seconds
            .as_deref()
            .and_then(|s| s.parse::<u64>().ok())
            .map_or(
                Duration::from_secs(DEFAULT_UPSTREAM_IDLE_TIMEOUT_SECONDS),
                Duration::from_secs,
            );

        if sigcache_max_entries == 0 {
            tracing::warn!("SIGCACHE_MAX_ENTRIES=0 disables the hot tier entirely");
        }

        Self {
            sigcache_max_entries,
            sigcache_db_path,
            sigcache_ttl_overrides,
            credential_max_backoff_level,
            request_timeout,
            upstream_idle_timeout,
            admin_password: raw.admin_password,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_nothing_set() {
        let cfg = GatewayConfig::from_raw(RawEnv::default());
        assert_eq!(cfg.sigcache_max_entries, DEFAULT_HOT_CAPACITY);
        assert_eq!(cfg.sigcache_db_path, DEFAULT_DB_PATH);
        assert_eq!(cfg.credential_max_backoff_level, DEFAULT_MAX_BACKOFF_LEVEL);
        assert_eq!(cfg.request_timeout, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECONDS));
        assert!(cfg.sigcache_ttl_overrides.is_empty());
    }

    #[test]
    fn overrides_parse_and_win_over_defaults() {
        let mut raw = RawEnv::default();
        raw.sigcache_max_entries = Some("500".to_string());
        raw.credential_max_backoff_level = Some("3".to_string());
        raw.sigcache_ttl_overrides.insert(ClientKind::Cursor, "60".to_string());
        let cfg = GatewayConfig::from_raw(raw);
        assert_eq!(cfg.sigcache_max_entries, 500);
        assert_eq!(cfg.credential_max_backoff_level, 3);
        assert_eq!(
            cfg.sigcache_ttl_overrides.get(&ClientKind::Cursor),
            Some(&Duration::from_secs(60))
        );
    }

    #[test]
    fn malformed_numeric_override_falls_back_to_default() {
        let mut raw = RawEnv::default();
        raw.sigcache_max_entries = Some("not-a-number".to_string());
        let cfg = GatewayConfig::from_raw(raw);
        assert_eq!(cfg.sigcache_max_entries, DEFAULT_HOT_CAPACITY);
    }
}
