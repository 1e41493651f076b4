//! Reply generation: cache, prompt, backend, cleanup, fallback.
//!
//! The [`Orchestrator`] is the hot path. A cache hit returns without touching
//! the backend. A miss builds a prompt, calls the backend under the configured
//! deadline, and cleans the text up. Any backend failure becomes an
//! in-character fallback line; only successful generations are cached.
//!
//! Concurrent requests for the same session are not serialized. Each exchange
//! appends its player and actor turns together, in completion order.

mod fallback;
mod postprocess;
mod prompt;

pub use fallback::pick_fallback;
pub use postprocess::clean_reply;
pub use prompt::{build_prompt, PromptInput, PromptLimits};

use crate::backend::{invoke_with_deadline, BackendError, GenerationBackend, GenerationRequest};
use crate::cache::{CacheTier, KeyContext, TwoTierCache};
use crate::config::WhisperConfig;
use crate::persona::{Mood, PersonaStore};
use crate::session::{ConversationTurn, SessionStore};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Errors the caller can act on. Backend trouble never shows up here.
#[derive(Debug, Error)]
pub enum DialogueError {
    #[error("Unknown actor: {0}")]
    UnknownActor(String),
}

/// Per-request context supplied by the caller.
///
/// Unset fields fall back to the actor profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DialogueContext {
    #[serde(default)]
    pub mood: Option<Mood>,
    #[serde(default)]
    pub relationship_level: Option<u8>,
    /// Shared or contextual memory snippets to mention in the prompt.
    #[serde(default)]
    pub memories: Vec<String>,
}

impl DialogueContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mood(mut self, mood: Mood) -> Self {
        self.mood = Some(mood);
        self
    }

    pub fn with_relationship_level(mut self, level: u8) -> Self {
        self.relationship_level = Some(level);
        self
    }

    pub fn with_memory(mut self, memory: impl Into<String>) -> Self {
        self.memories.push(memory.into());
        self
    }
}

/// Where a reply came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplySource {
    LocalCache,
    SharedCache,
    Generated,
    Fallback { reason: String },
}

/// A reply plus timing and cache metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub source: ReplySource,
    pub elapsed: Duration,
}

impl Reply {
    /// True when served from either cache tier.
    pub fn cached(&self) -> bool {
        matches!(
            self.source,
            ReplySource::LocalCache | ReplySource::SharedCache
        )
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.source, ReplySource::Fallback { .. })
    }
}

/// Produces actor replies.
pub struct Orchestrator {
    cache: TwoTierCache,
    sessions: SessionStore,
    personas: PersonaStore,
    backend: Arc<dyn GenerationBackend>,
    permits: Semaphore,
    config: WhisperConfig,
}

impl Orchestrator {
    pub fn new(
        config: WhisperConfig,
        personas: PersonaStore,
        cache: TwoTierCache,
        backend: Arc<dyn GenerationBackend>,
    ) -> Self {
        Self {
            sessions: SessionStore::new(config.session_max_turns),
            permits: Semaphore::new(config.max_concurrent_generations.max(1)),
            cache,
            personas,
            backend,
            config,
        }
    }

    pub fn cache(&self) -> &TwoTierCache {
        &self.cache
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn personas(&self) -> &PersonaStore {
        &self.personas
    }

    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }

    /// Produce a reply for `message` addressed to `actor_id`.
    ///
    /// When `session_id` is given, the session is created on first use and
    /// both turns of the exchange are appended to it.
    pub async fn generate_reply(
        &self,
        actor_id: &str,
        message: &str,
        session_id: Option<&str>,
        context: &DialogueContext,
    ) -> Result<Reply, DialogueError> {
        let started = Instant::now();
        let profile = self
            .personas
            .get(actor_id)
            .ok_or_else(|| DialogueError::UnknownActor(actor_id.to_string()))?;

        let mood = context.mood.unwrap_or(profile.mood);
        let relationship_level = context
            .relationship_level
            .unwrap_or(profile.relationship_level);

        if let Some(session_id) = session_id {
            self.sessions.create_if_absent(session_id, actor_id);
        }

        let key = self.cache.key_for(
            actor_id,
            message,
            KeyContext {
                mood,
                relationship_level,
            },
        );

        let (text, source) = if let Some(hit) = self.cache.get(&key).await {
            let source = match hit.tier {
                CacheTier::Local => ReplySource::LocalCache,
                CacheTier::Shared => ReplySource::SharedCache,
            };
            (hit.value, source)
        } else {
            let history = session_id
                .map(|id| self.sessions.get_recent(id, self.config.prompt_history_turns))
                .unwrap_or_default();
            let prompt = build_prompt(
                &PromptInput {
                    profile,
                    mood,
                    relationship_level,
                    history: &history,
                    memories: &context.memories,
                    message,
                },
                self.config.prompt_richness,
                PromptLimits {
                    history_turns: self.config.prompt_history_turns,
                    memories: self.config.prompt_memory_limit,
                },
            );

            match self.call_backend(prompt).await {
                Ok(raw) => {
                    let text = clean_reply(&raw, self.config.max_reply_chars);
                    if text.is_empty() {
                        warn!(actor = actor_id, "Reply empty after cleanup, using fallback");
                        let reason = BackendError::EmptyOutput.to_string();
                        (pick_fallback(profile, mood), ReplySource::Fallback { reason })
                    } else {
                        self.cache.put(&key, &text).await;
                        (text, ReplySource::Generated)
                    }
                }
                Err(e) => {
                    warn!(actor = actor_id, error = %e, "Generation failed, using fallback");
                    let reason = e.to_string();
                    (pick_fallback(profile, mood), ReplySource::Fallback { reason })
                }
            }
        };

        if let Some(session_id) = session_id {
            let exchange = [
                ConversationTurn::player(message),
                ConversationTurn::actor(text.clone()),
            ];
            if let Err(e) = self.sessions.append_turns(session_id, exchange) {
                // Evicted between create and append.
                debug!(session = session_id, error = %e, "Exchange not recorded");
            }
        }

        let reply = Reply {
            text,
            source,
            elapsed: started.elapsed(),
        };
        info!(
            actor = actor_id,
            source = ?reply.source,
            elapsed_ms = reply.elapsed.as_millis() as u64,
            "Reply ready"
        );
        Ok(reply)
    }

    /// Generate replies for common messages so later requests hit the cache.
    ///
    /// Sessions are not touched. Returns how many replies were generated or
    /// already cached; fallbacks do not count.
    pub async fn warm_up<S: AsRef<str>>(&self, messages: &[S]) -> usize {
        let context = DialogueContext::default();
        let actors = self.personas.ids();

        let calls = actors.iter().flat_map(|actor| {
            messages
                .iter()
                .map(move |message| (actor.as_str(), message.as_ref()))
        });
        let results = join_all(
            calls.map(|(actor, message)| self.generate_reply(actor, message, None, &context)),
        )
        .await;

        let warmed = results
            .iter()
            .filter(|r| matches!(r, Ok(reply) if !reply.is_fallback()))
            .count();
        info!(warmed, attempted = results.len(), "Cache warm-up finished");
        warmed
    }

    /// Wait for a backend slot and run the call, all within one deadline.
    async fn call_backend(&self, prompt: String) -> Result<String, BackendError> {
        let deadline = self.config.generation_timeout;
        let call = async {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|_| BackendError::Refused("generation pool closed".to_string()))?;

            invoke_with_deadline(self.backend.as_ref(), GenerationRequest::new(prompt), deadline)
                .await
        };

        match tokio::time::timeout(deadline, call).await {
            Ok(result) => result,
            Err(_) => {
                debug!(
                    deadline_ms = deadline.as_millis() as u64,
                    "Deadline passed while queued for a backend slot"
                );
                Err(BackendError::Timeout(deadline))
            }
        }
    }
}
