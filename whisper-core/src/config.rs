//! Service configuration.
//!
//! One orchestrator covers both the "standard" and "ultra-fast" deployments;
//! they differ only in [`PromptRichness`] and the shared-cache TTL.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors from reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// How much context goes into a generation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRichness {
    /// Persona fields, recent turns and injected memories.
    #[default]
    Full,
    /// Persona tagline plus the message; fastest to generate.
    Minimal,
}

impl FromStr for PromptRichness {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" | "standard" => Ok(Self::Full),
            "minimal" | "fast" | "ultra-fast" => Ok(Self::Minimal),
            _ => Err(()),
        }
    }
}

/// Configuration for a [`WhisperService`](crate::WhisperService).
#[derive(Debug, Clone)]
pub struct WhisperConfig {
    /// Entries kept in the in-process LRU tier.
    pub local_cache_capacity: usize,

    /// Expiry applied to entries written to the shared tier.
    pub shared_cache_ttl: Duration,

    /// Prefix for every key this service writes to the shared tier.
    pub cache_namespace: String,

    /// Turns retained per session.
    pub session_max_turns: usize,

    /// Sessions idle longer than this are evicted, if set.
    pub session_idle_timeout: Option<Duration>,

    pub prompt_richness: PromptRichness,

    /// Session turns included in a full prompt.
    pub prompt_history_turns: usize,

    /// Injected memory strings included in a full prompt.
    pub prompt_memory_limit: usize,

    /// Hard deadline for a dialogue generation call.
    pub generation_timeout: Duration,

    /// Hard deadline for a memory classification call.
    pub curation_timeout: Duration,

    /// Visible length limit for a reply, in characters.
    pub max_reply_chars: usize,

    /// Backend calls allowed in flight at once.
    pub max_concurrent_generations: usize,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            local_cache_capacity: 200,
            shared_cache_ttl: Duration::from_secs(2 * 60 * 60),
            cache_namespace: "whisper:reply:".to_string(),
            session_max_turns: 20,
            session_idle_timeout: None,
            prompt_richness: PromptRichness::Full,
            prompt_history_turns: 5,
            prompt_memory_limit: 3,
            generation_timeout: Duration::from_secs(15),
            curation_timeout: Duration::from_secs(30),
            max_reply_chars: 150,
            max_concurrent_generations: 3,
        }
    }
}

impl WhisperConfig {
    /// Build a configuration from `WHISPER_*` environment variables.
    ///
    /// Unset variables keep their defaults; set but unparsable ones are errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = parse_var::<usize>(&lookup, "WHISPER_CACHE_CAPACITY")? {
            config.local_cache_capacity = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, "WHISPER_CACHE_TTL_SECS")? {
            config.shared_cache_ttl = Duration::from_secs(v);
        }
        if let Some(v) = lookup("WHISPER_CACHE_NAMESPACE") {
            config.cache_namespace = v;
        }
        if let Some(v) = parse_var::<usize>(&lookup, "WHISPER_SESSION_MAX_TURNS")? {
            config.session_max_turns = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, "WHISPER_SESSION_IDLE_SECS")? {
            config.session_idle_timeout = Some(Duration::from_secs(v));
        }
        if let Some(v) = parse_var::<PromptRichness>(&lookup, "WHISPER_PROMPT_RICHNESS")? {
            config.prompt_richness = v;
        }
        if let Some(v) = parse_var::<u64>(&lookup, "WHISPER_GENERATION_TIMEOUT_SECS")? {
            config.generation_timeout = Duration::from_secs(v);
        }
        if let Some(v) = parse_var::<u64>(&lookup, "WHISPER_CURATION_TIMEOUT_SECS")? {
            config.curation_timeout = Duration::from_secs(v);
        }
        if let Some(v) = parse_var::<usize>(&lookup, "WHISPER_MAX_REPLY_CHARS")? {
            config.max_reply_chars = v;
        }
        if let Some(v) = parse_var::<usize>(&lookup, "WHISPER_MAX_CONCURRENT")? {
            config.max_concurrent_generations = v;
        }

        Ok(config)
    }

    /// Set the local LRU capacity.
    pub fn with_local_cache_capacity(mut self, capacity: usize) -> Self {
        self.local_cache_capacity = capacity;
        self
    }

    /// Set the shared-tier TTL.
    pub fn with_shared_cache_ttl(mut self, ttl: Duration) -> Self {
        self.shared_cache_ttl = ttl;
        self
    }

    /// Set the per-session turn bound.
    pub fn with_session_max_turns(mut self, turns: usize) -> Self {
        self.session_max_turns = turns;
        self
    }

    /// Evict sessions after this much inactivity.
    pub fn with_session_idle_timeout(mut self, idle: Duration) -> Self {
        self.session_idle_timeout = Some(idle);
        self
    }

    /// Set the prompt richness.
    pub fn with_prompt_richness(mut self, richness: PromptRichness) -> Self {
        self.prompt_richness = richness;
        self
    }

    /// Set the generation deadline.
    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    /// Set the curation deadline.
    pub fn with_curation_timeout(mut self, timeout: Duration) -> Self {
        self.curation_timeout = timeout;
        self
    }

    /// Set the visible reply length limit.
    pub fn with_max_reply_chars(mut self, chars: usize) -> Self {
        self.max_reply_chars = chars;
        self
    }

    /// Set how many backend calls may run concurrently.
    pub fn with_max_concurrent_generations(mut self, permits: usize) -> Self {
        self.max_concurrent_generations = permits;
        self
    }

    /// The "ultra-fast" preset: minimal prompts and a one-hour shared TTL.
    pub fn ultra_fast() -> Self {
        Self::default()
            .with_prompt_richness(PromptRichness::Minimal)
            .with_shared_cache_ttl(Duration::from_secs(60 * 60))
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}
