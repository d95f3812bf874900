//! Scoring result cache
//!
//! TTL + LRU cache for relevance scores, keyed by a stable digest of
//! (chunk id, query text, current file, current directory). Reads check the
//! TTL and drop expired entries; writes evict the oldest 10% of entries
//! once the cache reaches capacity so a hot batch never stalls on
//! one-at-a-time eviction.
//!
//! Entries appear atomically to concurrent queries: the map lives behind a
//! single lock, and a cloned score is returned rather than a reference.

use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use prism_core::RelevanceScore;

/// Stable cache key digest.
pub(crate) type CacheKey = [u8; 32];

/// Build the cache key for one (chunk, query, context) combination.
///
/// Fields are length-prefixed so distinct tuples can never collide by
/// concatenation.
pub(crate) fn cache_key(
    chunk_id: &str,
    query_text: &str,
    current_file: Option<&str>,
    current_directory: Option<&str>,
) -> CacheKey {
    let mut hasher = Sha256::new();
    for field in [
        chunk_id,
        query_text,
        current_file.unwrap_or(""),
        current_directory.unwrap_or(""),
    ] {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    hasher.finalize().into()
}

struct CachedScore {
    score: RelevanceScore,
    inserted_at: Instant,
}

/// TTL + LRU score cache.
pub(crate) struct ScoreCache {
    entries: Mutex<LruCache<CacheKey, CachedScore>>,
    capacity: usize,
    ttl: Duration,
}

impl ScoreCache {
    pub(crate) fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            // The LruCache is kept unbounded; the 10% sweep in `put`
            // enforces the capacity instead
            entries: Mutex::new(LruCache::unbounded()),
            capacity,
            ttl,
        }
    }

    /// Look up a score, honoring the TTL.
    pub(crate) fn get(&self, key: &CacheKey) -> Option<RelevanceScore> {
        let mut entries = self.entries.lock();
        let hit = entries
            .get(key)
            .map(|cached| (cached.inserted_at.elapsed() <= self.ttl, cached.score.clone()));
        match hit {
            Some((true, score)) => Some(score),
            Some((false, _)) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    /// Store a score, sweeping the oldest 10% when at capacity.
    pub(crate) fn put(&self, key: CacheKey, score: RelevanceScore) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            let evict = (self.capacity / 10).max(1);
            for _ in 0..evict {
                if entries.pop_lru().is_none() {
                    break;
                }
            }
        }
        entries.put(
            key,
            CachedScore {
                score,
                inserted_at: Instant::now(),
            },
        );
    }

    pub(crate) fn clear(&self) {
        self.entries.lock().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
