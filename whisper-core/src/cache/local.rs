//! In-process LRU tier.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// Fixed-capacity LRU map from cache key to reply text.
///
/// `LruCache` needs exclusive access even for reads (a hit reorders the
/// entry), so every operation takes the mutex briefly.
pub struct LocalCache {
    entries: Mutex<LruCache<String, String>>,
}

impl LocalCache {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Look up a key, marking it most recently used on a hit.
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    /// Insert or refresh a key, evicting the least recently used entry when full.
    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.lock().put(key.into(), value.into());
    }

    /// Check for a key without touching recency.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains(key)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.entries.lock().cap().get()
    }
}
