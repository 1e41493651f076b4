//! Latency-hiding dialogue engine for character NPCs.
//!
//! This crate provides:
//! - A two-tier reply cache keyed on normalized small talk
//! - Bounded per-session turn history
//! - Reply generation with a hard deadline and in-character fallbacks
//! - Memory curation via a backend classifier with a rule-based fallback
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use whisper_core::{
//!     DialogueRequest, GeminiBackend, InMemoryMemoryStore, PersonaStore, WhisperConfig,
//!     WhisperService,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = WhisperConfig::from_env()?;
//!     let personas = PersonaStore::load_dir("personas").await?;
//!     let backend = Arc::new(GeminiBackend::from_env()?);
//!     let service =
//!         WhisperService::local(config, personas, backend, Arc::new(InMemoryMemoryStore::new()));
//!
//!     let response = service
//!         .generate(DialogueRequest::new("npc-1", "你好").with_session("s1"))
//!         .await?;
//!     println!("{} (cached: {})", response.reply, response.cached);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod curator;
pub mod dialogue;
pub mod memory_store;
pub mod persona;
pub mod service;
pub mod session;
pub mod testing;

// Primary public API
pub use backend::{BackendError, CliBackend, GeminiBackend, GenerationBackend};
pub use cache::{InMemorySharedCache, SharedCache, TwoTierCache};
pub use config::{ConfigError, PromptRichness, WhisperConfig};
pub use curator::{candidate_limit, MemoryCandidate, MemoryCurator};
pub use dialogue::{DialogueContext, Reply, ReplySource};
pub use memory_store::{InMemoryMemoryStore, JsonlMemoryStore, LongTermMemory};
pub use persona::{ActorProfile, Mood, PersonaError, PersonaStore};
pub use service::{
    DialogueRequest, DialogueResponse, MemoryUpdate, MemoryUpdateOutcome, ServiceError,
    ServiceStatus, WhisperService,
};
pub use session::{ConversationTurn, SessionStore, Speaker};
pub use testing::{ScriptedBackend, ScriptedReply, TestHarness};
