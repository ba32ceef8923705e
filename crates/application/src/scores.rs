use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use lru::LruCache;

use domain::score::decay::apply_decay;
use domain::score::entity::{ScoreRecord, ScoreUpdate};
use domain::score::error::ScoreError;
use ports::secondary::score_store::ScoreStore;

/// How long a cached score may be served before falling back to the store.
pub const SCORE_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

const FALLBACK_CACHE_CAPACITY: usize = 1000;

/// A raw score held in the lookup cache. Decay is applied on every read,
/// so the cached value never goes stale in the decay dimension — only
/// `updated_at` drift (handled by the TTL) can make it stale.
#[derive(Debug, Clone, Copy)]
struct CachedScore {
    score: i32,
    updated_at: DateTime<Utc>,
    cached_at: DateTime<Utc>,
}

/// Two-tier reputation lookup: TTL-bounded LRU in front of the score
/// store, with exponential time-decay applied to every served score.
///
/// Writes go through this facade so the cache entry for the affected IP
/// is always invalidated.
pub struct ReputationService {
    store: Arc<dyn ScoreStore>,
    cache: Mutex<LruCache<String, CachedScore>>,
    ttl: TimeDelta,
}

impl ReputationService {
    pub fn new(store: Arc<dyn ScoreStore>, cache_size: usize) -> Self {
        Self::with_ttl(store, cache_size, SCORE_CACHE_TTL)
    }

    /// Custom TTL constructor, used by tests to force cache expiry.
    pub fn with_ttl(store: Arc<dyn ScoreStore>, cache_size: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(cache_size)
            .or_else(|| NonZeroUsize::new(FALLBACK_CACHE_CAPACITY))
            .expect("fallback capacity is non-zero");
        Self {
            store,
            cache: Mutex::new(LruCache::new(capacity)),
            ttl: TimeDelta::from_std(ttl).unwrap_or_else(|_| TimeDelta::seconds(300)),
        }
    }

    /// Resolve the current effective (decayed) score for an IP.
    /// Unknown IPs score 0 and are not cached.
    pub fn lookup(&self, ip: &str) -> Result<i32, ScoreError> {
        let now = Utc::now();

        {
            let mut cache = self.cache.lock().expect("score cache lock poisoned");
            if let Some(entry) = cache.get(ip).copied() {
                if now - entry.cached_at < self.ttl {
                    return Ok(apply_decay(entry.score, entry.updated_at, now));
                }
                cache.pop(ip);
            }
        }

        let Some(record) = self.store.get(ip)? else {
            tracing::debug!(ip, "no stored score, defaulting to 0");
            return Ok(0);
        };

        let entry = CachedScore {
            score: record.score,
            updated_at: record.updated_at,
            cached_at: now,
        };
        self.cache
            .lock()
            .expect("score cache lock poisoned")
            .put(ip.to_string(), entry);

        Ok(apply_decay(record.score, record.updated_at, now))
    }

    /// Drop the cached entry for an IP, forcing the next lookup through
    /// to the store.
    pub fn invalidate(&self, ip: &str) {
        self.cache
            .lock()
            .expect("score cache lock poisoned")
            .pop(ip);
    }

    /// Write a single record and invalidate its cache entry.
    pub fn upsert(&self, record: &ScoreRecord) -> Result<(), ScoreError> {
        self.store.upsert(record)?;
        self.invalidate(&record.ip);
        Ok(())
    }

    /// Apply a pushed score update: persist it and invalidate the cache.
    pub fn apply_update(&self, update: ScoreUpdate) -> Result<String, ScoreError> {
        let record = update.into_record(Utc::now());
        let ip = record.ip.clone();
        self.upsert(&record)?;
        Ok(ip)
    }

    /// Write many records and invalidate each affected cache entry.
    pub fn bulk_upsert(&self, records: &[ScoreRecord]) -> Result<(), ScoreError> {
        if records.is_empty() {
            return Ok(());
        }
        self.store.bulk_upsert(records)?;
        let mut cache = self.cache.lock().expect("score cache lock poisoned");
        for record in records {
            cache.pop(&record.ip);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ports::test_utils::{FailingScoreStore, MemoryScoreStore};

    fn record(ip: &str, score: i32) -> ScoreRecord {
        ScoreRecord::new(ip, score, Utc::now())
    }

    fn service_with(records: Vec<ScoreRecord>) -> (Arc<MemoryScoreStore>, ReputationService) {
        let store = Arc::new(MemoryScoreStore::with_records(records));
        let service = ReputationService::new(Arc::clone(&store) as Arc<dyn ScoreStore>, 16);
        (store, service)
    }

    #[test]
    fn unknown_ip_scores_zero() {
        let (store, service) = service_with(vec![]);
        assert_eq!(service.lookup("1.2.3.4").unwrap(), 0);
        assert_eq!(store.get_count(), 1);
        // Misses are not cached.
        assert_eq!(service.lookup("1.2.3.4").unwrap(), 0);
        assert_eq!(store.get_count(), 2);
    }

    #[test]
    fn fresh_record_served_undecayed() {
        let (_store, service) = service_with(vec![record("1.2.3.4", 75)]);
        assert_eq!(service.lookup("1.2.3.4").unwrap(), 75);
    }

    #[test]
    fn second_lookup_hits_cache() {
        let (store, service) = service_with(vec![record("1.2.3.4", 75)]);
        assert_eq!(service.lookup("1.2.3.4").unwrap(), 75);
        assert_eq!(service.lookup("1.2.3.4").unwrap(), 75);
        assert_eq!(store.get_count(), 1);
    }

    #[test]
    fn expired_ttl_falls_back_to_store() {
        let store = Arc::new(MemoryScoreStore::with_records(vec![record("1.2.3.4", 75)]));
        let service = ReputationService::with_ttl(
            Arc::clone(&store) as Arc<dyn ScoreStore>,
            16,
            Duration::ZERO,
        );
        service.lookup("1.2.3.4").unwrap();
        service.lookup("1.2.3.4").unwrap();
        assert_eq!(store.get_count(), 2);
    }

    #[test]
    fn upsert_invalidates_cached_entry() {
        let (_store, service) = service_with(vec![record("2.2.2.2", 80)]);
        assert_eq!(service.lookup("2.2.2.2").unwrap(), 80);
        service.upsert(&record("2.2.2.2", 10)).unwrap();
        assert_eq!(service.lookup("2.2.2.2").unwrap(), 10);
    }

    #[test]
    fn apply_update_persists_and_invalidates() {
        let (store, service) = service_with(vec![record("2.2.2.2", 80)]);
        assert_eq!(service.lookup("2.2.2.2").unwrap(), 80);

        let ip = service
            .apply_update(ScoreUpdate {
                ip: "2.2.2.2".to_string(),
                score: 10,
                timestamp: None,
            })
            .unwrap();
        assert_eq!(ip, "2.2.2.2");
        assert_eq!(service.lookup("2.2.2.2").unwrap(), 10);
        assert_eq!(store.record_count(), 1);
    }

    #[test]
    fn bulk_upsert_invalidates_each_ip() {
        let (_store, service) = service_with(vec![record("1.1.1.1", 30), record("2.2.2.2", 40)]);
        service.lookup("1.1.1.1").unwrap();
        service.lookup("2.2.2.2").unwrap();

        service
            .bulk_upsert(&[record("1.1.1.1", 31), record("2.2.2.2", 41)])
            .unwrap();

        assert_eq!(service.lookup("1.1.1.1").unwrap(), 31);
        assert_eq!(service.lookup("2.2.2.2").unwrap(), 41);
    }

    #[test]
    fn store_failure_propagates() {
        let service = ReputationService::new(Arc::new(FailingScoreStore), 16);
        assert!(service.lookup("1.2.3.4").is_err());
    }

    #[test]
    fn lru_evicts_oldest_entry() {
        let store = Arc::new(MemoryScoreStore::with_records(vec![
            record("1.1.1.1", 10),
            record("2.2.2.2", 20),
            record("3.3.3.3", 30),
        ]));
        let service = ReputationService::new(Arc::clone(&store) as Arc<dyn ScoreStore>, 2);

        service.lookup("1.1.1.1").unwrap();
        service.lookup("2.2.2.2").unwrap();
        service.lookup("3.3.3.3").unwrap(); // evicts 1.1.1.1
        assert_eq!(store.get_count(), 3);

        service.lookup("1.1.1.1").unwrap(); // miss again
        assert_eq!(store.get_count(), 4);
    }

    #[test]
    fn zero_cache_size_falls_back_to_default_capacity() {
        let (_store, service) = service_with(vec![record("1.2.3.4", 5)]);
        let _ = service; // constructed through new(); also cover explicit zero:
        let store = Arc::new(MemoryScoreStore::new());
        let service = ReputationService::new(store as Arc<dyn ScoreStore>, 0);
        assert_eq!(service.lookup("9.9.9.9").unwrap(), 0);
    }
}
