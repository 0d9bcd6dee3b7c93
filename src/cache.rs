//! TTL-bounded LRU cache for search results.
//!
//! Keys hash the full request (query, filters, limit); values carry the
//! result list and its creation time. Entries are purely derived data and
//! safe to drop at any moment — the retriever clears the whole cache on
//! every index refresh so stale results never outlive the records they
//! reference. Expired entries are swept lazily and at most once per purge
//! interval, so no background timer is needed.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::config::CacheConfig;
use crate::index::SearchResult;

struct CacheEntry {
    created: Instant,
    results: Vec<SearchResult>,
}

/// LRU+TTL cache keyed on (query, category, region, limit).
pub struct ResultCache {
    entries: LruCache<u64, CacheEntry>,
    ttl: Duration,
    purge_interval: Duration,
    last_purge: Instant,
}

impl ResultCache {
    /// Create a cache with the given capacity/TTL configuration.
    pub fn new(config: &CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            ttl: Duration::from_secs(config.ttl_secs),
            purge_interval: Duration::from_secs(config.purge_interval_secs),
            last_purge: Instant::now(),
        }
    }

    /// Hash a request into a cache key.
    pub fn key(query: &str, category: Option<&str>, region: Option<&str>, limit: usize) -> u64 {
        let mut hasher = DefaultHasher::new();
        query.hash(&mut hasher);
        category.hash(&mut hasher);
        region.hash(&mut hasher);
        limit.hash(&mut hasher);
        hasher.finish()
    }

    /// Fetch a live entry, dropping it instead if its TTL has elapsed.
    /// Also runs the amortized expired-entry sweep.
    pub fn get(&mut self, key: u64) -> Option<Vec<SearchResult>> {
        self.maybe_purge();

        match self.entries.get(&key) {
            Some(entry) if entry.created.elapsed() <= self.ttl => Some(entry.results.clone()),
            Some(_) => {
                self.entries.pop(&key);
                None
            }
            None => None,
        }
    }

    /// Store results for a request key.
    pub fn insert(&mut self, key: u64, results: Vec<SearchResult>) {
        self.entries.put(
            key,
            CacheEntry {
                created: Instant::now(),
                results,
            },
        );
    }

    /// Drop every entry. Called on index refresh.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of cached entries (live or not yet swept).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sweep expired entries, at most once per purge interval.
    fn maybe_purge(&mut self) {
        if self.last_purge.elapsed() < self.purge_interval {
            return;
        }
        self.last_purge = Instant::now();

        let expired: Vec<u64> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.created.elapsed() > self.ttl)
            .map(|(key, _)| *key)
            .collect();
        for key in expired {
            self.entries.pop(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MatchKind;

    fn sample_results() -> Vec<SearchResult> {
        vec![SearchResult {
            id: 1,
            question: "Q".to_string(),
            answer: "A".to_string(),
            category: "licensing".to_string(),
            region: None,
            score: 0.9,
            confidence: 1.0,
            match_kind: MatchKind::Fuzzy,
        }]
    }

    fn cache_with_ttl(ttl_secs: u64) -> ResultCache {
        ResultCache::new(&CacheConfig {
            capacity: 4,
            ttl_secs,
            purge_interval_secs: 0,
        })
    }

    #[test]
    fn test_insert_and_get() {
        let mut cache = cache_with_ttl(300);
        let key = ResultCache::key("ga license", None, None, 5);
        cache.insert(key, sample_results());

        let hit = cache.get(key).unwrap();
        assert_eq!(hit.len(), 1);
        assert_eq!(hit[0].id, 1);
    }

    #[test]
    fn test_key_distinguishes_filters_and_limit() {
        let base = ResultCache::key("q", None, None, 5);
        assert_ne!(base, ResultCache::key("q", Some("licensing"), None, 5));
        assert_ne!(base, ResultCache::key("q", None, Some("GA"), 5));
        assert_ne!(base, ResultCache::key("q", None, None, 10));
        assert_eq!(base, ResultCache::key("q", None, None, 5));
    }

    #[test]
    fn test_expired_entry_is_dropped() {
        let mut cache = cache_with_ttl(0);
        let key = ResultCache::key("q", None, None, 5);
        cache.insert(key, sample_results());

        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear_drops_everything() {
        let mut cache = cache_with_ttl(300);
        cache.insert(ResultCache::key("a", None, None, 5), sample_results());
        cache.insert(ResultCache::key("b", None, None, 5), sample_results());
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lru_eviction_respects_capacity() {
        let mut cache = ResultCache::new(&CacheConfig {
            capacity: 2,
            ttl_secs: 300,
            purge_interval_secs: 60,
        });
        for query in ["a", "b", "c"] {
            cache.insert(ResultCache::key(query, None, None, 5), sample_results());
        }
        assert_eq!(cache.len(), 2);
        // The oldest entry was evicted.
        assert!(cache.get(ResultCache::key("a", None, None, 5)).is_none());
    }
}
