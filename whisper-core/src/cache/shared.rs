//! Shared (cross-process) cache tier.
//!
//! The shared tier is an external TTL key-value store. It is optional: the
//! two-tier cache treats every error from it as "tier unavailable" and keeps
//! serving from the local tier.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Errors from a shared cache store.
#[derive(Debug, Error)]
pub enum SharedCacheError {
    #[error("Shared cache unreachable: {0}")]
    Unreachable(String),

    #[error("Shared cache operation failed: {0}")]
    Operation(String),
}

/// A TTL key-value store reachable by every service instance.
#[async_trait]
pub trait SharedCache: Send + Sync {
    /// Check connectivity.
    async fn ping(&self) -> Result<(), SharedCacheError>;

    async fn get(&self, key: &str) -> Result<Option<String>, SharedCacheError>;

    /// Store a value that expires after `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), SharedCacheError>;

    /// Delete every key starting with `prefix`, returning how many were removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, SharedCacheError>;
}

/// A shared tier kept in process memory.
///
/// Useful when several orchestrators in one process should share replies,
/// and as the reference behaviour for network-backed implementations.
#[derive(Default)]
pub struct InMemorySharedCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl InMemorySharedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unexpired entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|(_, expires)| *expires > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SharedCache for InMemorySharedCache {
    async fn ping(&self) -> Result<(), SharedCacheError> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, SharedCacheError> {
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => return Ok(Some(value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), SharedCacheError> {
        self.entries
            .lock()
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, SharedCacheError> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok(before - entries.len())
    }
}
