//! Long-term memory sinks.
//!
//! The core only appends candidates; ranking and reading them back is left
//! to whatever consumes the store.

use crate::curator::MemoryCandidate;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Records kept per actor by [`InMemoryMemoryStore`].
pub const IN_MEMORY_CAP: usize = 50;

/// Errors from memory sinks.
#[derive(Debug, Error)]
pub enum MemoryStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Actor id not usable as a file name: {0}")]
    InvalidActorId(String),
}

/// Append-only sink for memory candidates.
#[async_trait]
pub trait LongTermMemory: Send + Sync {
    async fn append(&self, actor_id: &str, candidates: &[MemoryCandidate])
        -> Result<(), MemoryStoreError>;
}

/// One `<actor_id>.jsonl` file per actor under a directory.
pub struct JsonlMemoryStore {
    dir: PathBuf,
}

impl JsonlMemoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of an actor's file.
    pub fn path_for(&self, actor_id: &str) -> Result<PathBuf, MemoryStoreError> {
        let usable = !actor_id.is_empty()
            && actor_id != "."
            && actor_id != ".."
            && !actor_id.contains(['/', '\\', '\0']);
        if !usable {
            return Err(MemoryStoreError::InvalidActorId(actor_id.to_string()));
        }
        Ok(self.dir.join(format!("{actor_id}.jsonl")))
    }
}

#[async_trait]
impl LongTermMemory for JsonlMemoryStore {
    async fn append(
        &self,
        actor_id: &str,
        candidates: &[MemoryCandidate],
    ) -> Result<(), MemoryStoreError> {
        if candidates.is_empty() {
            return Ok(());
        }
        let path = self.path_for(actor_id)?;

        let mut buf = String::new();
        for candidate in candidates {
            buf.push_str(&serde_json::to_string(candidate)?);
            buf.push('\n');
        }

        fs::create_dir_all(&self.dir).await?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(buf.as_bytes()).await?;
        file.flush().await?;

        debug!(
            actor = actor_id,
            count = candidates.len(),
            path = %path.display(),
            "Memories appended"
        );
        Ok(())
    }
}

/// Keeps the most recent records per actor in memory.
pub struct InMemoryMemoryStore {
    cap: usize,
    records: Mutex<HashMap<String, VecDeque<MemoryCandidate>>>,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self::with_cap(IN_MEMORY_CAP)
    }

    pub fn with_cap(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Records held for an actor, oldest first.
    pub fn records(&self, actor_id: &str) -> Vec<MemoryCandidate> {
        self.records
            .lock()
            .get(actor_id)
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for InMemoryMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LongTermMemory for InMemoryMemoryStore {
    async fn append(
        &self,
        actor_id: &str,
        candidates: &[MemoryCandidate],
    ) -> Result<(), MemoryStoreError> {
        let mut records = self.records.lock();
        let entry = records.entry(actor_id.to_string()).or_default();
        entry.extend(candidates.iter().cloned());
        while entry.len() > self.cap {
            entry.pop_front();
        }
        Ok(())
    }
}
