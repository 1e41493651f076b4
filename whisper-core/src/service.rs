//! Request-level facade over the orchestrator, curator and memory sink.
//!
//! Only caller mistakes leave this layer as errors. Backend, cache and
//! memory-sink trouble is absorbed and logged.

use crate::backend::GenerationBackend;
use crate::cache::{SharedCache, TwoTierCache};
use crate::config::{PromptRichness, WhisperConfig};
use crate::curator::{rules, CandidateSource, MemoryCandidate, MemoryCurator};
use crate::dialogue::{DialogueContext, DialogueError, Orchestrator, ReplySource};
use crate::memory_store::LongTermMemory;
use crate::persona::PersonaStore;
use crate::session::ConversationTurn;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Errors reported to callers.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Unknown actor: {0}")]
    UnknownActor(String),

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<DialogueError> for ServiceError {
    fn from(e: DialogueError) -> Self {
        match e {
            DialogueError::UnknownActor(id) => ServiceError::UnknownActor(id),
        }
    }
}

/// An inbound dialogue request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueRequest {
    #[serde(alias = "npc_id")]
    pub actor_id: String,
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub context: DialogueContext,
}

impl DialogueRequest {
    pub fn new(actor_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            message: message.into(),
            session_id: None,
            context: DialogueContext::default(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_context(mut self, context: DialogueContext) -> Self {
        self.context = context;
        self
    }

    /// Parse a JSON payload. Unknown moods and missing fields are rejected.
    pub fn from_json(payload: &str) -> Result<Self, ServiceError> {
        serde_json::from_str(payload).map_err(|e| ServiceError::InvalidRequest(e.to_string()))
    }

    fn validate(&self) -> Result<(), ServiceError> {
        if self.actor_id.trim().is_empty() {
            return Err(ServiceError::InvalidRequest("actor_id is empty".to_string()));
        }
        if self.message.trim().is_empty() {
            return Err(ServiceError::InvalidRequest("message is empty".to_string()));
        }
        if matches!(&self.session_id, Some(id) if id.trim().is_empty()) {
            return Err(ServiceError::InvalidRequest("session_id is empty".to_string()));
        }
        Ok(())
    }
}

/// Reply plus timing and cache metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DialogueResponse {
    pub reply: String,
    pub cached: bool,
    pub source: ReplySource,
    pub elapsed_ms: u64,
    pub session_id: Option<String>,
}

/// A direct request to remember something.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryUpdate {
    #[serde(alias = "npc_id")]
    pub actor_id: String,
    pub memory_type: String,
    pub content: String,
    pub importance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryUpdateOutcome {
    pub success: bool,
}

/// Operational snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStatus {
    pub cache_size: usize,
    pub sessions_active: usize,
    pub personas_loaded: usize,
    pub shared_cache_enabled: bool,
    pub prompt_richness: PromptRichness,
}

/// The dialogue service. Construct one and share it by reference.
pub struct WhisperService {
    orchestrator: Orchestrator,
    curator: MemoryCurator,
    memory: Arc<dyn LongTermMemory>,
    last_eviction: Mutex<Option<Instant>>,
}

impl WhisperService {
    pub fn new(
        config: WhisperConfig,
        personas: PersonaStore,
        cache: TwoTierCache,
        backend: Arc<dyn GenerationBackend>,
        memory: Arc<dyn LongTermMemory>,
    ) -> Self {
        let curator = MemoryCurator::new(backend.clone(), config.curation_timeout);
        Self {
            orchestrator: Orchestrator::new(config, personas, cache, backend),
            curator,
            memory,
            last_eviction: Mutex::new(None),
        }
    }

    /// A service with only the local cache tier.
    pub fn local(
        config: WhisperConfig,
        personas: PersonaStore,
        backend: Arc<dyn GenerationBackend>,
        memory: Arc<dyn LongTermMemory>,
    ) -> Self {
        let cache =
            TwoTierCache::local_only(config.local_cache_capacity, config.cache_namespace.clone());
        Self::new(config, personas, cache, backend, memory)
    }

    /// A service backed by a shared cache tier, if it answers.
    pub async fn with_shared_cache(
        config: WhisperConfig,
        personas: PersonaStore,
        backend: Arc<dyn GenerationBackend>,
        memory: Arc<dyn LongTermMemory>,
        shared: Arc<dyn SharedCache>,
    ) -> Self {
        let cache = TwoTierCache::connect(
            config.local_cache_capacity,
            config.cache_namespace.clone(),
            config.shared_cache_ttl,
            shared,
        )
        .await;
        Self::new(config, personas, cache, backend, memory)
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Answer a dialogue request.
    pub async fn generate(
        &self,
        request: DialogueRequest,
    ) -> Result<DialogueResponse, ServiceError> {
        request.validate()?;

        if let Some(idle) = self.orchestrator.config().session_idle_timeout {
            self.evict_idle_sessions(idle);
        }

        let reply = self
            .orchestrator
            .generate_reply(
                &request.actor_id,
                &request.message,
                request.session_id.as_deref(),
                &request.context,
            )
            .await?;

        Ok(DialogueResponse {
            cached: reply.cached(),
            elapsed_ms: reply.elapsed.as_millis() as u64,
            reply: reply.text,
            source: reply.source,
            session_id: request.session_id,
        })
    }

    /// Store one memory directly, scored by the rules.
    pub async fn update_memory(
        &self,
        update: MemoryUpdate,
    ) -> Result<MemoryUpdateOutcome, ServiceError> {
        if !self.orchestrator.personas().contains(&update.actor_id) {
            return Err(ServiceError::UnknownActor(update.actor_id));
        }
        if update.content.trim().is_empty() {
            return Err(ServiceError::InvalidRequest("content is empty".to_string()));
        }
        if !update.importance.is_finite() {
            return Err(ServiceError::InvalidRequest(
                "importance is not a number".to_string(),
            ));
        }

        let turn = ConversationTurn::player(update.content.trim());
        let score = rules::score_turn(&turn);
        let mut keywords = vec![update.memory_type.clone()];
        let emotional_impact = match score {
            Some(score) => {
                keywords.extend(score.keywords);
                score.emotional_impact
            }
            None => 0.0,
        };

        let candidate = MemoryCandidate {
            summary: rules::summarize(&turn.text),
            turn,
            importance_score: update.importance.clamp(0.0, 1.0),
            emotional_impact,
            keywords,
            promoted: false,
            source: CandidateSource::Manual,
        };

        match self.memory.append(&update.actor_id, &[candidate]).await {
            Ok(()) => {
                info!(actor = %update.actor_id, memory_type = %update.memory_type, "Memory stored");
                Ok(MemoryUpdateOutcome { success: true })
            }
            Err(e) => {
                error!(actor = %update.actor_id, error = %e, "Failed to store memory");
                Ok(MemoryUpdateOutcome { success: false })
            }
        }
    }

    /// Curate a session's turns and append the result to the memory sink.
    pub async fn curate_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<MemoryCandidate>, ServiceError> {
        let sessions = self.orchestrator.sessions();
        let (Some(actor_id), Some(turns)) =
            (sessions.actor_of(session_id), sessions.turns(session_id))
        else {
            return Err(ServiceError::UnknownSession(session_id.to_string()));
        };

        let name = self
            .orchestrator
            .personas()
            .get(&actor_id)
            .map(|p| p.display_name.clone())
            .unwrap_or_else(|| actor_id.clone());

        let candidates = self.curator.curate(&name, &turns).await;
        if !candidates.is_empty() {
            if let Err(e) = self.memory.append(&actor_id, &candidates).await {
                warn!(
                    actor = %actor_id,
                    session = session_id,
                    error = %e,
                    "Curated memories not stored"
                );
            }
        }
        Ok(candidates)
    }

    /// Pre-generate replies to common messages for every persona.
    pub async fn warm_up<S: AsRef<str>>(&self, messages: &[S]) -> usize {
        self.orchestrator.warm_up(messages).await
    }

    pub fn status(&self) -> ServiceStatus {
        let cache = self.orchestrator.cache();
        ServiceStatus {
            cache_size: cache.len(),
            sessions_active: self.orchestrator.sessions().len(),
            personas_loaded: self.orchestrator.personas().len(),
            shared_cache_enabled: cache.shared_enabled(),
            prompt_richness: self.orchestrator.config().prompt_richness,
        }
    }

    /// Empty both cache tiers.
    pub async fn clear_cache(&self) {
        self.orchestrator.cache().clear().await;
    }

    /// Drop idle sessions, at most once per quarter of the idle timeout.
    fn evict_idle_sessions(&self, idle: Duration) {
        let now = Instant::now();
        {
            let mut last = self.last_eviction.lock();
            if matches!(*last, Some(at) if now.duration_since(at) < idle / 4) {
                return;
            }
            *last = Some(now);
        }
        self.orchestrator.sessions().evict_idle(idle);
    }
}
