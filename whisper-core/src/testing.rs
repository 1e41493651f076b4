//! Testing utilities.
//!
//! - `ScriptedBackend` for deterministic generation without a real model
//! - `UnreachableSharedCache` for exercising degraded cache modes
//! - `sample_personas` with the three stock town residents
//! - `TestHarness` wiring all of the above into a service

use crate::backend::{BackendError, GenerationBackend, GenerationRequest};
use crate::cache::{SharedCache, SharedCacheError};
use crate::config::WhisperConfig;
use crate::memory_store::InMemoryMemoryStore;
use crate::persona::{ActorProfile, Mood, PersonaStore};
use crate::service::{DialogueRequest, DialogueResponse, ServiceError, WhisperService};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One scripted backend outcome.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    /// Succeeds with an empty string.
    Empty,
    /// Fails with a transport error.
    Fail(String),
    /// Never completes; only a deadline ends it.
    Hang,
    /// Succeeds after a delay.
    Delayed(Duration, String),
}

impl ScriptedReply {
    pub fn text(text: impl Into<String>) -> Self {
        ScriptedReply::Text(text.into())
    }

    pub fn fail(message: impl Into<String>) -> Self {
        ScriptedReply::Fail(message.into())
    }
}

/// A backend that plays back scripted outcomes in order.
///
/// Once the script runs out it keeps returning the default reply.
pub struct ScriptedBackend {
    script: Mutex<VecDeque<ScriptedReply>>,
    default: ScriptedReply,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(script: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            default: ScriptedReply::text("嗯嗯，我知道了。"),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Reply used after the script is exhausted.
    pub fn with_default(mut self, reply: ScriptedReply) -> Self {
        self.default = reply;
        self
    }

    /// Number of generate calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every prompt received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate(&self, request: GenerationRequest) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(request.prompt);
        let next = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default.clone());

        match next {
            ScriptedReply::Text(text) => Ok(text),
            ScriptedReply::Empty => Ok(String::new()),
            ScriptedReply::Fail(message) => Err(BackendError::Transport(message)),
            ScriptedReply::Hang => std::future::pending().await,
            ScriptedReply::Delayed(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// A shared cache that is never there when needed.
pub struct UnreachableSharedCache {
    reachable_at_startup: bool,
}

impl UnreachableSharedCache {
    /// Fails every call, including the startup ping.
    pub fn new() -> Self {
        Self {
            reachable_at_startup: false,
        }
    }

    /// Answers the startup ping, then fails every call.
    pub fn reachable_at_startup() -> Self {
        Self {
            reachable_at_startup: true,
        }
    }
}

impl Default for UnreachableSharedCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SharedCache for UnreachableSharedCache {
    async fn ping(&self) -> Result<(), SharedCacheError> {
        if self.reachable_at_startup {
            Ok(())
        } else {
            Err(SharedCacheError::Unreachable("connection refused".to_string()))
        }
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, SharedCacheError> {
        Err(SharedCacheError::Unreachable("connection reset".to_string()))
    }

    async fn set_ex(
        &self,
        _key: &str,
        _value: &str,
        _ttl: Duration,
    ) -> Result<(), SharedCacheError> {
        Err(SharedCacheError::Unreachable("connection reset".to_string()))
    }

    async fn delete_prefix(&self, _prefix: &str) -> Result<usize, SharedCacheError> {
        Err(SharedCacheError::Unreachable("connection reset".to_string()))
    }
}

/// The three stock residents, with their own fallback lines.
pub fn sample_personas() -> PersonaStore {
    PersonaStore::from_profiles([
        ActorProfile::new("npc-1", "鋁配咻")
            .with_personality("安靜內斂的藝術家，觀察力敏銳，說話帶點詩意")
            .with_background("住在湖邊的小屋，每天清晨都會去畫湖面的光影")
            .with_tagline("鋁配咻：喜歡畫畫、說話溫柔的藝術家")
            .with_mood(Mood::Dreamy)
            .with_relationship_level(3)
            .with_fallback_lines(Mood::Dreamy, ["光影又在湖面上跳舞了呢……", "讓我把這句話畫進畫裡。"])
            .with_fallback_lines(Mood::Neutral, ["嗯，我在聽。"]),
        ActorProfile::new("npc-2", "流羽岑")
            .with_personality("活潑開朗，喜歡交朋友，常用表情符號")
            .with_background("在市集經營花店，認識小鎮上每一個人")
            .with_tagline("流羽岑：花店裡最熱情的店員")
            .with_mood(Mood::Cheerful)
            .with_relationship_level(5)
            .with_fallback_lines(Mood::Cheerful, ["哇～真的嗎！✨", "嘿嘿，再跟我多說一點嘛！😊"]),
        ActorProfile::new("npc-3", "沉停鞍")
            .with_personality("理性冷靜，其實很溫暖，總是默默照顧別人")
            .with_background("鎮上圖書館的管理員，喜歡研究星象")
            .with_tagline("沉停鞍：話不多但可靠的圖書館員")
            .with_mood(Mood::Calm)
            .with_relationship_level(2)
            .with_fallback_lines(Mood::Calm, ["我明白了。慢慢來，不用急。"]),
    ])
}

/// A service wired to a scripted backend and an in-memory sink.
pub struct TestHarness {
    service: WhisperService,
    backend: Arc<ScriptedBackend>,
    memory: Arc<InMemoryMemoryStore>,
}

impl TestHarness {
    pub fn new(script: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self::with_config(WhisperConfig::default(), script)
    }

    pub fn with_config(
        config: WhisperConfig,
        script: impl IntoIterator<Item = ScriptedReply>,
    ) -> Self {
        Self::with_backend(config, ScriptedBackend::new(script))
    }

    pub fn with_backend(config: WhisperConfig, backend: ScriptedBackend) -> Self {
        let backend = Arc::new(backend);
        let memory = Arc::new(InMemoryMemoryStore::new());
        let service =
            WhisperService::local(config, sample_personas(), backend.clone(), memory.clone());
        Self {
            service,
            backend,
            memory,
        }
    }

    pub fn service(&self) -> &WhisperService {
        &self.service
    }

    pub fn backend(&self) -> &ScriptedBackend {
        &self.backend
    }

    pub fn memory(&self) -> &InMemoryMemoryStore {
        &self.memory
    }

    /// Send one message, optionally within a session.
    pub async fn say(
        &self,
        actor_id: &str,
        message: &str,
        session_id: Option<&str>,
    ) -> Result<DialogueResponse, ServiceError> {
        let mut request = DialogueRequest::new(actor_id, message);
        if let Some(id) = session_id {
            request = request.with_session(id);
        }
        self.service.generate(request).await
    }
}
