//! LRU cache of field validation outcomes

use lru::LruCache;
use std::num::NonZeroUsize;

pub const DEFAULT_CACHE_SIZE: usize = 100;

/// Field name plus a fingerprint of the rule set and the inputs
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub field: String,
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedOutcome {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

pub struct ValidationCache {
    entries: LruCache<CacheKey, CachedOutcome>,
}

impl ValidationCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    /// Look up and mark as most recently used
    pub fn get(&mut self, key: &CacheKey) -> Option<CachedOutcome> {
        self.entries.get(key).cloned()
    }

    pub fn put(&mut self, key: CacheKey, outcome: CachedOutcome) {
        self.entries.put(key, outcome);
    }

    /// Drop every entry recorded for `field`
    pub fn clear_field(&mut self, field: &str) {
        let stale: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(key, _)| key.field == field)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            self.entries.pop(key);
        }
        if !stale.is_empty() {
            tracing::debug!("cleared {} cached results for `{field}`", stale.len());
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> CacheKey {
        CacheKey {
            field: name.to_string(),
            fingerprint: String::new(),
        }
    }

    fn outcome() -> CachedOutcome {
        CachedOutcome {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_evicts_least_recently_inserted() {
        let mut cache = ValidationCache::new(2);
        cache.put(key("a"), outcome());
        cache.put(key("b"), outcome());
        cache.put(key("c"), outcome());

        assert!(cache.get(&key("a")).is_none());
        assert!(cache.get(&key("b")).is_some());
        assert!(cache.get(&key("c")).is_some());
    }

    #[test]
    fn test_access_refreshes_entry() {
        let mut cache = ValidationCache::new(2);
        cache.put(key("a"), outcome());
        cache.put(key("b"), outcome());
        assert!(cache.get(&key("a")).is_some());
        cache.put(key("c"), outcome());

        assert!(cache.get(&key("a")).is_some());
        assert!(cache.get(&key("b")).is_none());
    }

    #[test]
    fn test_clear_field() {
        let mut cache = ValidationCache::new(10);
        cache.put(key("a"), outcome());
        cache.put(
            CacheKey {
                field: "a".into(),
                fingerprint: "other".into(),
            },
            outcome(),
        );
        cache.put(key("b"), outcome());

        cache.clear_field("a");

        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key("b")).is_some());
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut cache = ValidationCache::new(0);
        cache.put(key("a"), outcome());
        assert_eq!(cache.len(), 1);
    }
}
