//! Credential Pool (§4.E): selection, cooldown bookkeeping, and a
//! condvar-based waker so `acquire` blocks without polling.
//!
//! Grounded on `providers/src/retry.rs`'s backoff-schedule shape, generalized
//! from a single-request retry delay into a standing per-(credential,model)
//! cooldown table, and on `gateway_sigstore::durable::DurableTier`'s
//! background-thread-plus-condvar pattern for "don't poll" (§9).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use gateway_types::{Credential, CredentialKind, CredentialStatus, ModelCooldownStatus, DEFAULT_MAX_BACKOFF_LEVEL};
use tracing::info;

use crate::durable::DurableCredentials;
use crate::error::CredentialError;

/// Outcome of one upstream call, fed back via `release` (§4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    RateLimited,
    OtherError,
}

struct PoolState {
    credentials: Vec<Credential>,
}

struct Inner {
    state: Mutex<PoolState>,
    condvar: Condvar,
    max_backoff_level: u32,
    durable: Option<DurableCredentials>,
    shutdown: AtomicBool,
}

/// Per-credential + per-model cooldown pool (§4.E). Cheaply `Clone`-able;
/// every clone shares the same underlying state and background waker.
#[derive(Clone)]
pub struct CredentialPool {
    inner: Arc<Inner>,
    waker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

#[must_use]
pub fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

impl CredentialPool {
    #[must_use]
    pub fn new(credentials: Vec<Credential>, max_backoff_level: u32) -> Self {
        Self::build(credentials, max_backoff_level, None)
    }

    pub fn open(
        credentials: Vec<Credential>,
        max_backoff_level: u32,
        durable: DurableCredentials,
    ) -> Result<Self, CredentialError> {
        let mut persisted = durable.load_all()?;
        for credential in credentials {
            if !persisted.iter().any(|p| p.id == credential.id) {
                persisted.push(credential);
            }
        }
        Ok(Self::build(persisted, max_backoff_level, Some(durable)))
    }

    fn build(credentials: Vec<Credential>, max_backoff_level: u32, durable: Option<DurableCredentials>) -> Self {
        let inner = Arc::new(Inner {
            state: Mutex::new(PoolState { credentials }),
            condvar: Condvar::new(),
            max_backoff_level,
            durable,
            shutdown: AtomicBool::new(false),
        });

        let worker_inner = Arc::clone(&inner);
        let handle = std::thread::spawn(move || run_waker(worker_inner));

        Self { inner, waker: Arc::new(Mutex::new(Some(handle))) }
    }

    /// Selection policy (§4.E): disabled==false && eligible, oldest
    /// `last_updated` first, lexicographic id tie-break. Blocks until a
    /// credential becomes eligible or `deadline` elapses.
    pub fn acquire(&self, model: &str, deadline: Instant) -> Result<String, CredentialError> {
        // `retry_after_secs` on a `Deadline` error is always reported relative
        // to when this request arrived, not to whatever moment inside the
        // blocking loop happens to produce the error — otherwise a caller who
        // blocked for most of its own deadline would be told a cooldown far
        // shorter than the one that's actually still outstanding.
        let request_start_secs = now_secs();
        let mut state = self.inner.state.lock().unwrap();
        loop {
            if let Some(id) = select(&state.credentials, model, now_secs()) {
                return Ok(id);
            }
            let earliest = earliest_cooldown(&state.credentials, model);
            let now = Instant::now();
            let wait_for = earliest
                .map(|secs| Duration::from_secs(secs.saturating_sub(now_secs())))
                .unwrap_or(Duration::from_secs(60));
            let wait_for = wait_for.min(deadline.saturating_duration_since(now));
            if wait_for.is_zero() {
                let retry_after_secs = earliest.map(|secs| secs.saturating_sub(request_start_secs)).unwrap_or(0);
                return Err(CredentialError::Deadline { retry_after_secs });
            }
            let (guard, _timeout) = self.inner.condvar.wait_timeout(state, wait_for).unwrap();
            state = guard;
            if Instant::now() >= deadline {
                let retry_after_secs = earliest_cooldown(&state.credentials, model)
                    .map(|secs| secs.saturating_sub(request_start_secs))
                    .unwrap_or(0);
                return Err(CredentialError::Deadline { retry_after_secs });
            }
        }
    }

    /// Applies an upstream call's outcome to `(credential_id, model)`'s
    /// cooldown and persists the new state (§4.E).
    pub fn release(&self, credential_id: &str, model: &str, outcome: Outcome) {
        let now = now_secs();
        let mut state = self.inner.state.lock().unwrap();
        let Some(credential) = state.credentials.iter_mut().find(|c| c.id == credential_id) else {
            return;
        };
        let entry = credential.cooldown_for(model);
        let updated = match outcome {
            Outcome::Success => entry.on_success(now),
            Outcome::RateLimited => {
                let next = entry.on_rate_limited(now, self.inner.max_backoff_level);
                info!(
                    credential = credential_id,
                    model,
                    backoff_level = next.backoff_level,
                    cooldown_until = next.cooldown_until,
                    "credential entered cooldown after rate limit"
                );
                next
            }
            Outcome::OtherError => entry,
        };
        credential.model_cooldowns.insert(model.to_string(), updated);
        if let Some(durable) = &self.inner.durable {
            if let Err(err) = durable.persist(credential) {
                tracing::warn!(error = %err, "failed to persist credential cooldown state");
            }
        }
        drop(state);
        self.inner.condvar.notify_all();
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<CredentialStatus> {
        let now = now_secs();
        let state = self.inner.state.lock().unwrap();
        state
            .credentials
            .iter()
            .map(|c| CredentialStatus {
                id: c.id.clone(),
                kind: c.kind,
                disabled: c.disabled,
                models: c
                    .model_cooldowns
                    .iter()
                    .map(|(model, entry)| {
                        (
                            model.clone(),
                            ModelCooldownStatus {
                                cooldown_until: entry.cooldown_until,
                                backoff_level: entry.backoff_level,
                                seconds_remaining: entry.cooldown_until.saturating_sub(now),
                            },
                        )
                    })
                    .collect(),
            })
            .collect()
    }

    #[must_use]
    pub fn add_credential(&self, id: impl Into<String>, kind: CredentialKind) -> String {
        let id = id.into();
        let mut state = self.inner.state.lock().unwrap();
        state.credentials.push(Credential::new(id.clone(), kind));
        self.inner.condvar.notify_all();
        id
    }
}

impl Drop for CredentialPool {
    fn drop(&mut self) {
        // Only the last handle (strong_count==1 for `inner`) should stop the
        // waker thread; cheap clones share the same background worker.
        if Arc::strong_count(&self.inner) == 1 {
            // Set the flag under the same mutex the waker's wait_timeout
            // releases and reacquires atomically, so the flag flip can never
            // land in the gap between the waker's predicate check and its
            // call into wait_timeout (which would otherwise lose the wakeup
            // and block this join for a full waker cycle).
            {
                let _guard = self.inner.state.lock().unwrap();
                self.inner.shutdown.store(true, Ordering::Relaxed);
            }
            self.inner.condvar.notify_all();
            if let Some(handle) = self.waker.lock().unwrap().take() {
                let _ = handle.join();
            }
        }
    }
}

fn select(credentials: &[Credential], model: &str, now: u64) -> Option<String> {
    credentials
        .iter()
        .filter(|c| c.is_eligible_for(model, now))
        .min_by(|a, b| {
            a.cooldown_for(model)
                .last_updated
                .cmp(&b.cooldown_for(model).last_updated)
                .then_with(|| a.id.cmp(&b.id))
        })
        .map(|c| c.id.clone())
}

fn earliest_cooldown(credentials: &[Credential], model: &str) -> Option<u64> {
    credentials
        .iter()
        .filter(|c| !c.disabled)
        .map(|c| c.cooldown_for(model).cooldown_until)
        .min()
}

/// Background waker (§9): sleeps to the nearest known `cooldown_until`
/// across all models currently present, then broadcasts so any blocked
/// `acquire` re-checks eligibility. Never busy-polls.
fn run_waker(inner: Arc<Inner>) {
    loop {
        let mut state = inner.state.lock().unwrap();
        if inner.shutdown.load(Ordering::Relaxed) {
            return;
        }
        let earliest = state
            .credentials
            .iter()
            .filter(|c| !c.disabled)
            .flat_map(|c| c.model_cooldowns.values())
            .map(|entry| entry.cooldown_until)
            .filter(|&until| until > now_secs())
            .min();

        let wait_for = match earliest {
            Some(until) => Duration::from_secs(until.saturating_sub(now_secs())),
            None => Duration::from_secs(300),
        };
        let (guard, _timeout) = inner.condvar.wait_timeout(state, wait_for).unwrap();
        state = guard;
        drop(state);
        if inner.shutdown.load(Ordering::Relaxed) {
            return;
        }
        inner.condvar.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_prefers_oldest_last_updated_among_eligible() {
        let mut a = Credential::new("a", CredentialKind::Antigravity);
        a.model_cooldowns.insert("m".into(), gateway_types::CooldownEntry { cooldown_until: 0, backoff_level: 0, last_updated: 500 });
        let mut b = Credential::new("b", CredentialKind::Antigravity);
        b.model_cooldowns.insert("m".into(), gateway_types::CooldownEntry { cooldown_until: 0, backoff_level: 0, last_updated: 100 });
        let pool = CredentialPool::new(vec![a, b], DEFAULT_MAX_BACKOFF_LEVEL);

        let id = pool.acquire("m", Instant::now() + Duration::from_millis(50)).unwrap();
        assert_eq!(id, "b");
    }

    #[test]
    fn rate_limited_then_success_resets_backoff() {
        let pool = CredentialPool::new(vec![Credential::new("c1", CredentialKind::Antigravity)], DEFAULT_MAX_BACKOFF_LEVEL);
        pool.release("c1", "m", Outcome::RateLimited);
        pool.release("c1", "m", Outcome::RateLimited);
        pool.release("c1", "m", Outcome::RateLimited);
        let status = pool.snapshot();
        assert_eq!(status[0].models["m"].backoff_level, 3);

        pool.release("c1", "m", Outcome::Success);
        let status = pool.snapshot();
        assert_eq!(status[0].models["m"].backoff_level, 0);
    }

    #[test]
    fn acquire_times_out_when_all_cooling_past_deadline() {
        let mut c1 = Credential::new("c1", CredentialKind::Antigravity);
        c1.model_cooldowns.insert("m".into(), gateway_types::CooldownEntry { cooldown_until: now_secs() + 60, backoff_level: 1, last_updated: now_secs() });
        let pool = CredentialPool::new(vec![c1], DEFAULT_MAX_BACKOFF_LEVEL);

        let err = pool.acquire("m", Instant::now() + Duration::from_millis(30)).unwrap_err();
        // The cooldown is 60s out from when the request arrived; the reported
        // retry-after must reflect that, not whatever's left after blocking
        // for the (much shorter) 30ms deadline.
        assert!(matches!(err, CredentialError::Deadline { retry_after_secs } if retry_after_secs == 60));
    }

    #[test]
    fn disabled_credential_is_never_selected() {
        let mut c1 = Credential::new("c1", CredentialKind::Antigravity);
        c1.disabled = true;
        let c2 = Credential::new("c2", CredentialKind::Antigravity);
        let pool = CredentialPool::new(vec![c1, c2], DEFAULT_MAX_BACKOFF_LEVEL);

        let id = pool.acquire("m", Instant::now() + Duration::from_millis(50)).unwrap();
        assert_eq!(id, "c2");
    }
}
