//! Two-tier reply cache.
//!
//! Reads go local LRU → shared TTL store → miss. Writes go to both tiers.
//! The shared tier may be absent or failing; in that case the cache runs
//! local-only and says so in the log once, not on every request.

pub mod key;
mod local;
pub mod shared;

pub use key::{cache_key, normalize_message, KeyContext};
pub use local::LocalCache;
pub use shared::{InMemorySharedCache, SharedCache, SharedCacheError};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Which tier served a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Local,
    Shared,
}

/// A successful cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHit {
    pub value: String,
    pub tier: CacheTier,
}

/// Local LRU in front of an optional shared store.
pub struct TwoTierCache {
    local: LocalCache,
    shared: Option<Arc<dyn SharedCache>>,
    namespace: String,
    shared_ttl: Duration,
    shared_healthy: AtomicBool,
}

impl TwoTierCache {
    /// A cache with no shared tier.
    pub fn local_only(capacity: usize, namespace: impl Into<String>) -> Self {
        Self {
            local: LocalCache::new(capacity),
            shared: None,
            namespace: namespace.into(),
            shared_ttl: Duration::ZERO,
            shared_healthy: AtomicBool::new(false),
        }
    }

    /// Attach a shared tier, falling back to local-only if it does not answer a ping.
    pub async fn connect(
        capacity: usize,
        namespace: impl Into<String>,
        shared_ttl: Duration,
        shared: Arc<dyn SharedCache>,
    ) -> Self {
        let mut cache = Self::local_only(capacity, namespace);

        match shared.ping().await {
            Ok(()) => {
                info!(ttl_secs = shared_ttl.as_secs(), "Shared cache tier connected");
                cache.shared = Some(shared);
                cache.shared_ttl = shared_ttl;
                cache.shared_healthy.store(true, Ordering::Relaxed);
            }
            Err(e) => {
                warn!(error = %e, "Shared cache tier unavailable, running local-only");
            }
        }

        cache
    }

    /// Build the key for a request under this cache's namespace.
    pub fn key_for(&self, actor_id: &str, message: &str, context: KeyContext) -> String {
        cache_key(&self.namespace, actor_id, message, context)
    }

    /// Whether a shared tier was attached at startup.
    pub fn shared_enabled(&self) -> bool {
        self.shared.is_some()
    }

    /// Whether the last shared-tier operation succeeded.
    pub fn shared_healthy(&self) -> bool {
        self.shared.is_some() && self.shared_healthy.load(Ordering::Relaxed)
    }

    /// Look a key up, local tier first.
    ///
    /// A shared-tier hit is copied into the local tier.
    pub async fn get(&self, key: &str) -> Option<CacheHit> {
        if let Some(value) = self.local.get(key) {
            debug!(key = short(key), "Local cache hit");
            return Some(CacheHit {
                value,
                tier: CacheTier::Local,
            });
        }

        let shared = self.shared.as_ref()?;
        match shared.get(key).await {
            Ok(Some(value)) => {
                self.mark_shared_ok();
                debug!(key = short(key), "Shared cache hit");
                self.local.put(key, value.clone());
                Some(CacheHit {
                    value,
                    tier: CacheTier::Shared,
                })
            }
            Ok(None) => {
                self.mark_shared_ok();
                None
            }
            Err(e) => {
                self.mark_shared_failed("get", &e);
                None
            }
        }
    }

    /// Write a value through to both tiers.
    pub async fn put(&self, key: &str, value: &str) {
        self.local.put(key, value);

        if let Some(shared) = &self.shared {
            match shared.set_ex(key, value, self.shared_ttl).await {
                Ok(()) => self.mark_shared_ok(),
                Err(e) => self.mark_shared_failed("set", &e),
            }
        }
    }

    /// Empty the local tier and this namespace of the shared tier.
    pub async fn clear(&self) {
        let local_entries = self.local.len();
        self.local.clear();

        let mut shared_entries = 0;
        if let Some(shared) = &self.shared {
            match shared.delete_prefix(&self.namespace).await {
                Ok(n) => {
                    self.mark_shared_ok();
                    shared_entries = n;
                }
                Err(e) => self.mark_shared_failed("clear", &e),
            }
        }

        info!(local_entries, shared_entries, "Cache cleared");
    }

    /// Entries in the local tier.
    pub fn len(&self) -> usize {
        self.local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }

    fn mark_shared_ok(&self) {
        if !self.shared_healthy.swap(true, Ordering::Relaxed) {
            info!("Shared cache tier recovered");
        }
    }

    fn mark_shared_failed(&self, operation: &str, error: &SharedCacheError) {
        if self.shared_healthy.swap(false, Ordering::Relaxed) {
            warn!(operation, error = %error, "Shared cache tier failing, serving local-only");
        } else {
            debug!(operation, error = %error, "Shared cache tier still failing");
        }
    }
}

/// Leading part of a key, for logs.
fn short(key: &str) -> &str {
    let end = key
        .char_indices()
        .nth(32)
        .map(|(i, _)| i)
        .unwrap_or(key.len());
    &key[..end]
}
