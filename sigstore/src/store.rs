//! The Signature Store facade (§4.A): hot tier + durable tier, combined.
//!
//! TTL enforcement happens here, at read time: a record whose `created_at`
//! is older than its client kind's TTL is
//! treated as a miss even if still physically present in either tier.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use gateway_types::{ClientKind, FingerprintKind, SignatureRecord};

use crate::durable::DurableTier;
use crate::error::SigStoreError;
use crate::hot::HotTier;

#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct Stats {
    pub hot_hits: u64,
    pub hot_misses: u64,
    pub durable_hits: u64,
    pub durable_misses: u64,
    pub queue_depth: u64,
    pub evictions: u64,
}

#[derive(Default)]
struct Counters {
    hot_hits: AtomicU64,
    hot_misses: AtomicU64,
    durable_hits: AtomicU64,
    durable_misses: AtomicU64,
}

pub struct SignatureStore {
    hot: HotTier,
    durable: DurableTier,
    counters: Counters,
    ttl_overrides: std::collections::HashMap<ClientKind, Duration>,
}

impl SignatureStore {
    pub fn open(path: &Path, hot_capacity: usize) -> Result<Self, SigStoreError> {
        Ok(Self {
            hot: HotTier::new(hot_capacity),
            durable: DurableTier::open(path)?,
            counters: Counters::default(),
            ttl_overrides: std::collections::HashMap::new(),
        })
    }

    pub fn open_in_memory(hot_capacity: usize) -> Result<Self, SigStoreError> {
        Ok(Self {
            hot: HotTier::new(hot_capacity),
            durable: DurableTier::open_in_memory()?,
            counters: Counters::default(),
            ttl_overrides: std::collections::HashMap::new(),
        })
    }

    /// Override the default TTL for a client kind (`SIGCACHE_TTL_<CLIENT>`).
    pub fn set_ttl_override(&mut self, client_kind: ClientKind, ttl: Duration) {
        self.ttl_overrides.insert(client_kind, ttl);
    }

    /// Allocates the next record id. Callers that need to widen a record's
    /// keys after the fact (e.g. the translator's adjacent-tool-use link,
    /// §3.2 `tool_key`) reuse the returned id across multiple `put` calls.
    #[must_use]
    pub fn next_id(&self) -> gateway_types::SignatureId {
        self.hot.next_id()
    }

    fn ttl_for(&self, client_kind: ClientKind) -> Duration {
        self.ttl_overrides
            .get(&client_kind)
            .copied()
            .unwrap_or_else(|| client_kind.default_ttl())
    }

    /// Insert under every applicable `(kind, key)` pair. Overwrites
    /// `last_access` on conflict (handled by the underlying tiers' upsert).
    pub fn put(&self, record: SignatureRecord, keys: Vec<(FingerprintKind, String)>) {
        self.hot.put(record.clone(), &keys);
        self.durable.put(record, keys);
    }

    /// Point lookup. Consults the hot tier first; on miss, falls through to
    /// the durable tier (and backfills the hot tier on a durable hit) —
    /// read-through per §4.A.
    pub fn get_by(&self, kind: FingerprintKind, key: &str, now: u64) -> Option<SignatureRecord> {
        if let Some(record) = self.hot.get_by(kind, key) {
            if self.is_expired(&record, now) {
                self.counters.hot_misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            self.counters.hot_hits.fetch_add(1, Ordering::Relaxed);
            self.hot.touch(record.id, now);
            return Some(record);
        }
        self.counters.hot_misses.fetch_add(1, Ordering::Relaxed);

        match self.durable.get_by(kind, key) {
            Some(record) if !self.is_expired(&record, now) => {
                self.counters.durable_hits.fetch_add(1, Ordering::Relaxed);
                self.hot.put(record.clone(), &[(kind, key.to_string())]);
                Some(record)
            }
            Some(_) => {
                self.counters.durable_misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.counters.durable_misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn is_expired(&self, record: &SignatureRecord, now: u64) -> bool {
        !record.is_within_ttl(now, self.ttl_for(record.client_kind))
    }

    /// Last-resort fallback (§4.B layer 7): newest record within the window,
    /// regardless of key. Hot tier first, then durable.
    pub fn recent_within(&self, now: u64, window_seconds: u64) -> Option<SignatureRecord> {
        self.hot
            .recent_within(now, window_seconds)
            .or_else(|| self.durable.recent_within(now, window_seconds))
    }

    #[must_use]
    pub fn stats(&self) -> Stats {
        Stats {
            hot_hits: self.counters.hot_hits.load(Ordering::Relaxed),
            hot_misses: self.counters.hot_misses.load(Ordering::Relaxed),
            durable_hits: self.counters.durable_hits.load(Ordering::Relaxed),
            durable_misses: self.counters.durable_misses.load(Ordering::Relaxed),
            queue_depth: self.durable.queue_depth() as u64,
            evictions: self.hot.evictions(),
        }
    }
}
