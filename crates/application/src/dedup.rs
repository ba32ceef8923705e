use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use sha2::{Digest, Sha256};

use domain::policy::entity::Decision;

const FALLBACK_CAPACITY: usize = 100;

/// Stable deduplication key for a recommendation: the IP plus a short
/// hash over the canonically-ordered blocking decisions.
///
/// Decisions are sorted by `(reason, blocklist)` before hashing so the
/// key is invariant under reordering. The first 8 digest bytes keep the
/// key compact.
pub fn dedup_key(ip: &str, decisions: &[Decision]) -> String {
    let mut sorted: Vec<&Decision> = decisions.iter().collect();
    sorted.sort_by(|a, b| (&a.reason, &a.blocklist).cmp(&(&b.reason, &b.blocklist)));

    let canonical =
        serde_json::to_vec(&sorted).expect("decisions serialize to JSON infallibly");
    let digest = Sha256::digest(&canonical);

    let mut short = String::with_capacity(16);
    for byte in &digest[..8] {
        short.push_str(&format!("{byte:02x}"));
    }

    format!("ip:{ip}:decisions:{short}")
}

/// LRU of recently submitted recommendation keys. A key's presence means
/// the identical recommendation was already sent and must be suppressed.
pub struct RecommendationCache {
    cache: Mutex<LruCache<String, ()>>,
}

impl RecommendationCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .or_else(|| NonZeroUsize::new(FALLBACK_CAPACITY))
            .expect("fallback capacity is non-zero");
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        // `get` rather than `peek`: a repeat sighting refreshes recency.
        self.cache
            .lock()
            .expect("dedup cache lock poisoned")
            .get(key)
            .is_some()
    }

    pub fn insert(&self, key: String) {
        self.cache
            .lock()
            .expect("dedup cache lock poisoned")
            .put(key, ());
    }

    /// Remove every key belonging to `ip`, called when a fresh score for
    /// that IP arrives and previous suppression no longer applies.
    pub fn purge_ip(&self, ip: &str) {
        let prefix = format!("ip:{ip}:");
        let mut cache = self.cache.lock().expect("dedup cache lock poisoned");
        let stale: Vec<String> = cache
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            cache.pop(&key);
        }
    }

    /// Drop everything, used when the blocklist set itself changes.
    pub fn clear(&self) {
        self.cache.lock().expect("dedup cache lock poisoned").clear();
    }

    pub fn len(&self) -> usize {
        self.cache.lock().expect("dedup cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
