//! Sharded fingerprint cache (C5a), grounded on the teacher's
//! `parking_lot`-guarded sharded-by-key tables. Each shard owns its own
//! `lru::LruCache` so no single lock serializes the whole cache.

use crate::types::{AuditRecord, Verdict};
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, Notify};

pub type Fingerprint = [u8; 32];

const SHARD_COUNT: usize = 16;

#[derive(Debug, Clone)]
pub struct CachedVerdict {
    pub verdict: Verdict,
    pub attestation_id: Option<[u8; 32]>,
    pub cached_at: DateTime<Utc>,
}

struct Shard {
    entries: Mutex<LruCache<Fingerprint, CachedVerdict>>,
}

/// Cache of already-computed Verdicts keyed by Decision fingerprint, with
/// single-flight request coalescing so concurrent callers for the same
/// fingerprint share one verification pass instead of each re-running it.
pub struct FingerprintCache {
    shards: Vec<Shard>,
    in_flight: AsyncMutex<std::collections::HashMap<Fingerprint, Arc<Notify>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl FingerprintCache {
    pub fn new(capacity_per_shard: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity_per_shard.max(1)).unwrap();
        let shards = (0..SHARD_COUNT)
            .map(|_| Shard {
                entries: Mutex::new(LruCache::new(capacity)),
            })
            .collect();
        Self {
            shards,
            in_flight: AsyncMutex::new(std::collections::HashMap::new()),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    fn shard_for(&self, fingerprint: &Fingerprint) -> &Shard {
        &self.shards[fingerprint[0] as usize % SHARD_COUNT]
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<CachedVerdict> {
        let shard = self.shard_for(fingerprint);
        let mut entries = shard.entries.lock();
        let found = entries.get(fingerprint).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// `get`, but treats an entry older than `ttl` as a miss and evicts it
    /// — market conditions the cached Verdict was computed under may no
    /// longer hold (spec.md §4.5's TTL/staleness requirement).
    pub fn get_fresh(&self, fingerprint: &Fingerprint, now: DateTime<Utc>, ttl: chrono::Duration) -> Option<CachedVerdict> {
        let shard = self.shard_for(fingerprint);
        let mut entries = shard.entries.lock();
        match entries.get(fingerprint) {
            Some(cached) if now.signed_duration_since(cached.cached_at) <= ttl => {
                let cached = cached.clone();
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(cached)
            }
            Some(_) => {
                entries.pop(fingerprint);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, fingerprint: Fingerprint, cached: CachedVerdict) {
        let shard = self.shard_for(&fingerprint);
        shard.entries.lock().put(fingerprint, cached);
    }

    /// Registers this caller as the leader for `fingerprint` if no one is
    /// already computing it, returning `None` in that case (caller should
    /// compute and then call `finish`). If someone else is already in
    /// flight, returns a `Notify` to await before re-checking the cache.
    pub async fn begin_single_flight(&self, fingerprint: Fingerprint) -> Option<Arc<Notify>> {
        let mut in_flight = self.in_flight.lock().await;
        if let Some(notify) = in_flight.get(&fingerprint) {
            return Some(notify.clone());
        }
        in_flight.insert(fingerprint, Arc::new(Notify::new()));
        None
    }

    /// Called by the single-flight leader once it has computed and cached
    /// the result, waking every follower that queued behind it.
    pub async fn finish_single_flight(&self, fingerprint: Fingerprint) {
        let mut in_flight = self.in_flight.lock().await;
        if let Some(notify) = in_flight.remove(&fingerprint) {
            notify.notify_waiters();
        }
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let misses = self.misses.load(Ordering::Relaxed) as f64;
        if hits + misses == 0.0 {
            0.0
        } else {
            hits / (hits + misses)
        }
    }
}

/// Constructs the `attestation_id` to store alongside a cached verdict:
/// the same 32-byte commitment the audit log references, so a cache hit and
/// an audit lookup agree on identity without re-hashing anything.
pub fn attestation_id_for(record: &AuditRecord) -> Option<[u8; 32]> {
    record.attestation_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Explanation, Recommendation, RiskFactors, RiskLevel};
    use chrono::Utc;

    fn sample_verdict() -> Verdict {
        Verdict {
            trust_score: 91.5,
            risk_level: RiskLevel::Low,
            recommendation: Recommendation::Approve,
            factors: RiskFactors::empty(),
            explanations: vec![Explanation {
                factor: "volatility".into(),
                weight: 0.3,
                message: "within bounds".into(),
            }],
            evaluated_at: Utc::now(),
            deadline_hit: false,
            policy_version: 1,
            code_version: 7,
        }
    }

    #[test]
    fn insert_then_get_hits() {
        let cache = FingerprintCache::new(8);
        let fp = [3u8; 32];
        cache.insert(
            fp,
            CachedVerdict {
                verdict: sample_verdict(),
                attestation_id: None,
                cached_at: Utc::now(),
            },
        );
        assert!(cache.get(&fp).is_some());
        assert!(cache.hit_rate() > 0.0);
    }

    #[test]
    fn miss_on_unknown_fingerprint() {
        let cache = FingerprintCache::new(8);
        assert!(cache.get(&[9u8; 32]).is_none());
    }

    #[tokio::test]
    async fn single_flight_second_caller_is_told_to_wait() {
        let cache = FingerprintCache::new(8);
        let fp = [5u8; 32];
        assert!(cache.begin_single_flight(fp).await.is_none());
        assert!(cache.begin_single_flight(fp).await.is_some());
        cache.finish_single_flight(fp).await;
        assert!(cache.begin_single_flight(fp).await.is_none());
    }
}
