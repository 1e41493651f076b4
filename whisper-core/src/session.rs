//! Per-conversation turn history.
//!
//! Each session keeps a sliding window of its most recent turns. Older turns
//! fall off the front; long-term retention is the curator's job, not ours.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default number of turns kept per session.
pub const DEFAULT_MAX_TURNS: usize = 20;

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),
}

/// Who said a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Player,
    Actor,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::Player => "PLAYER",
            Speaker::Actor => "NPC",
        }
    }
}

/// One line of dialogue. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Emotion tag attached upstream, e.g. "happy" or "sad".
    #[serde(default)]
    pub emotion: Option<String>,
}

impl ConversationTurn {
    /// A player turn stamped now.
    pub fn player(text: impl Into<String>) -> Self {
        Self::new(Speaker::Player, text)
    }

    /// An actor turn stamped now.
    pub fn actor(text: impl Into<String>) -> Self {
        Self::new(Speaker::Actor, text)
    }

    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
            timestamp: Utc::now(),
            emotion: None,
        }
    }

    pub fn with_emotion(mut self, emotion: impl Into<String>) -> Self {
        self.emotion = Some(emotion.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

#[derive(Debug)]
struct Session {
    actor_id: String,
    turns: VecDeque<ConversationTurn>,
    last_active: Instant,
}

/// Bounded turn history for every live session.
pub struct SessionStore {
    max_turns: usize,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    /// Create a store keeping at most `max_turns` turns per session (minimum 1).
    pub fn new(max_turns: usize) -> Self {
        Self {
            max_turns: max_turns.max(1),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Create the session if it does not exist. Returns true if it was created.
    ///
    /// An existing session keeps its original actor.
    pub fn create_if_absent(&self, session_id: &str, actor_id: &str) -> bool {
        let mut sessions = self.sessions.lock();
        if let Some(existing) = sessions.get(session_id) {
            if existing.actor_id != actor_id {
                warn!(
                    session = session_id,
                    owner = %existing.actor_id,
                    actor = actor_id,
                    "Session reused with a different actor"
                );
            }
            return false;
        }

        sessions.insert(
            session_id.to_string(),
            Session {
                actor_id: actor_id.to_string(),
                turns: VecDeque::with_capacity(self.max_turns),
                last_active: Instant::now(),
            },
        );
        debug!(session = session_id, actor = actor_id, "Session created");
        true
    }

    /// Append one turn, dropping the oldest turns beyond the bound.
    pub fn append_turn(
        &self,
        session_id: &str,
        turn: ConversationTurn,
    ) -> Result<(), SessionError> {
        self.append_turns(session_id, [turn])
    }

    /// Append several turns under one lock so they stay adjacent.
    pub fn append_turns(
        &self,
        session_id: &str,
        turns: impl IntoIterator<Item = ConversationTurn>,
    ) -> Result<(), SessionError> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        for turn in turns {
            session.turns.push_back(turn);
        }
        while session.turns.len() > self.max_turns {
            session.turns.pop_front();
        }
        session.last_active = Instant::now();
        Ok(())
    }

    /// The last `n` turns in chronological order; empty for unknown sessions.
    pub fn get_recent(&self, session_id: &str, n: usize) -> Vec<ConversationTurn> {
        let sessions = self.sessions.lock();
        let Some(session) = sessions.get(session_id) else {
            return Vec::new();
        };

        let skip = session.turns.len().saturating_sub(n);
        session.turns.iter().skip(skip).cloned().collect()
    }

    /// Every retained turn of a session, if it exists.
    pub fn turns(&self, session_id: &str) -> Option<Vec<ConversationTurn>> {
        self.sessions
            .lock()
            .get(session_id)
            .map(|s| s.turns.iter().cloned().collect())
    }

    /// The actor a session was created for.
    pub fn actor_of(&self, session_id: &str) -> Option<String> {
        self.sessions
            .lock()
            .get(session_id)
            .map(|s| s.actor_id.clone())
    }

    /// Drop sessions with no activity for longer than `max_idle`.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, s| now.duration_since(s.last_active) <= max_idle);
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, "Evicted idle sessions");
        }
        evicted
    }

    /// Forget a session. Returns false if it did not exist.
    pub fn remove(&self, session_id: &str) -> bool {
        self.sessions.lock().remove(session_id).is_some()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TURNS)
    }
}
