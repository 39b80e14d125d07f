//! Boundary: reads recognized environment variables (§6).
//!
//! All `std::env::var` access lives here. The pure [`GatewayConfig`] struct
//! and its defaults live in `lib.rs`; this module only gathers raw strings
//! and hands them to `GatewayConfig::from_raw` — a gather/hold split so
//! nothing downstream reads the environment directly.

use std::collections::HashMap;

use gateway_types::ClientKind;

/// Raw string values read from the environment, before parsing/defaulting.
#[derive(Debug, Default, Clone)]
pub struct RawEnv {
    pub sigcache_max_entries: Option<String>,
    pub sigcache_db_path: Option<String>,
    pub sigcache_ttl_overrides: HashMap<ClientKind, String>,
    pub credential_max_backoff_level: Option<String>,
    pub request_timeout_seconds: Option<String>,
    pub upstream_idle_timeout_seconds: Option<String>,
    pub admin_password: Option<String>,
}

const TTL_CLIENTS: &[(&str, ClientKind)] = &[
    ("SIGCACHE_TTL_GENERIC", ClientKind::Generic),
    ("SIGCACHE_TTL_CURSOR", ClientKind::Cursor),
    ("SIGCACHE_TTL_WINDSURF", ClientKind::Windsurf),
    ("SIGCACHE_TTL_AUGMENT", ClientKind::Augment),
];

impl RawEnv {
    /// Gathers every recognized variable from the process environment.
    /// Called once at startup; missing variables are `None`, resolved to
    /// defaults by [`super::GatewayConfig::from_raw`].
    #[must_use]
    pub fn gather() -> Self {
        let mut sigcache_ttl_overrides = HashMap::new();
        for (name, kind) in TTL_CLIENTS {
            if let Ok(value) = std::env::var(name) {
                sigcache_ttl_overrides.insert(*kind, value);
            }
        }

        Self {
            sigcache_max_entries: std::env::var("SIGCACHE_MAX_ENTRIES").ok(),
            sigcache_db_path: std::env::var("SIGCACHE_DB_PATH").ok(),
            sigcache_ttl_overrides,
            credential_max_backoff_level: std::env::var("CREDENTIAL_MAX_BACKOFF_LEVEL").ok(),
            request_timeout_seconds: std::env::var("REQUEST_TIMEOUT_SECONDS").ok(),
            upstream_idle_timeout_seconds: std::env::var("UPSTREAM_IDLE_TIMEOUT_SECONDS").ok(),
            admin_password: std::env::var("GATEWAY_ADMIN_PASSWORD").ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gather_reads_recognized_variables() {
        // SAFETY: test runs single-threaded w.r.t. this var via serial env access;
        // no other test in this module touches SIGCACHE_MAX_ENTRIES.
        unsafe {
            std::env::set_var("SIGCACHE_MAX_ENTRIES", "42");
        }
        let raw = RawEnv::gather();
        assert_eq!(raw.sigcache_max_entries.as_deref(), Some("42"));
        unsafe {
            std::env::remove_var("SIGCACHE_MAX_ENTRIES");
        }
    }
}
