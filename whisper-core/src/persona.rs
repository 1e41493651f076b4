//! Persona profiles and the read-only persona store.
//!
//! Profiles are authored as JSON files, one per actor. The dialogue engine
//! only ever reads them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

/// Errors from loading personas.
#[derive(Debug, Error)]
pub enum PersonaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid persona file {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Persona file {path} has an empty id")]
    MissingId { path: String },
}

/// Current emotional state of an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    #[default]
    Neutral,
    Cheerful,
    Calm,
    Warm,
    Thoughtful,
    Dreamy,
    Happy,
    Sad,
}

impl Mood {
    pub const ALL: [Mood; 8] = [
        Mood::Neutral,
        Mood::Cheerful,
        Mood::Calm,
        Mood::Warm,
        Mood::Thoughtful,
        Mood::Dreamy,
        Mood::Happy,
        Mood::Sad,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Neutral => "neutral",
            Mood::Cheerful => "cheerful",
            Mood::Calm => "calm",
            Mood::Warm => "warm",
            Mood::Thoughtful => "thoughtful",
            Mood::Dreamy => "dreamy",
            Mood::Happy => "happy",
            Mood::Sad => "sad",
        }
    }

    /// Tone guidance given to the backend for this mood.
    pub fn tone(&self) -> &'static str {
        match self {
            Mood::Neutral => "自然平和",
            Mood::Cheerful => "活潑開朗",
            Mood::Calm => "平靜溫和",
            Mood::Warm => "溫暖親切",
            Mood::Thoughtful => "深思熟慮",
            Mood::Dreamy => "夢幻浪漫",
            Mood::Happy => "開心愉快",
            Mood::Sad => "低落但真誠",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mood {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Mood::ALL
            .into_iter()
            .find(|m| m.as_str() == lowered)
            .ok_or_else(|| format!("unknown mood: {s}"))
    }
}

/// A character the player can talk to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorProfile {
    pub id: String,

    pub display_name: String,

    /// Long-form personality description.
    #[serde(default)]
    pub personality: String,

    #[serde(default)]
    pub background: String,

    /// Sample lines showing how the actor writes.
    #[serde(default)]
    pub chat_style: Option<String>,

    /// One-line summary used by minimal prompts.
    #[serde(default)]
    pub tagline: Option<String>,

    #[serde(default)]
    pub mood: Mood,

    /// 0 = stranger, 10 = closest friend.
    #[serde(default)]
    pub relationship_level: u8,

    /// Canned replies used when generation fails, keyed by mood.
    #[serde(default)]
    pub fallback_lines: BTreeMap<Mood, Vec<String>>,
}

impl ActorProfile {
    /// Create a profile with only the required fields.
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            personality: String::new(),
            background: String::new(),
            chat_style: None,
            tagline: None,
            mood: Mood::Neutral,
            relationship_level: 0,
            fallback_lines: BTreeMap::new(),
        }
    }

    pub fn with_personality(mut self, personality: impl Into<String>) -> Self {
        self.personality = personality.into();
        self
    }

    pub fn with_background(mut self, background: impl Into<String>) -> Self {
        self.background = background.into();
        self
    }

    pub fn with_tagline(mut self, tagline: impl Into<String>) -> Self {
        self.tagline = Some(tagline.into());
        self
    }

    pub fn with_mood(mut self, mood: Mood) -> Self {
        self.mood = mood;
        self
    }

    pub fn with_relationship_level(mut self, level: u8) -> Self {
        self.relationship_level = level;
        self
    }

    /// Add canned fallback lines for a mood.
    pub fn with_fallback_lines<I, S>(mut self, mood: Mood, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback_lines
            .entry(mood)
            .or_default()
            .extend(lines.into_iter().map(Into::into));
        self
    }

    /// The short description for minimal prompts.
    pub fn summary_line(&self) -> String {
        match &self.tagline {
            Some(tagline) if !tagline.trim().is_empty() => tagline.clone(),
            _ => format!("{}：友善的小鎮居民", self.display_name),
        }
    }
}

/// Read-only lookup from actor id to profile.
#[derive(Debug, Clone, Default)]
pub struct PersonaStore {
    profiles: HashMap<String, ActorProfile>,
}

impl PersonaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from already-constructed profiles.
    pub fn from_profiles(profiles: impl IntoIterator<Item = ActorProfile>) -> Self {
        let mut store = Self::new();
        for profile in profiles {
            store.insert(profile);
        }
        store
    }

    /// Load every `*.json` file in a directory as a persona.
    pub async fn load_dir(dir: impl AsRef<Path>) -> Result<Self, PersonaError> {
        let dir = dir.as_ref();
        let mut store = Self::new();
        let mut entries = fs::read_dir(dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let content = fs::read_to_string(&path).await?;
            let profile: ActorProfile =
                serde_json::from_str(&content).map_err(|source| PersonaError::Json {
                    path: path.display().to_string(),
                    source,
                })?;
            if profile.id.trim().is_empty() {
                return Err(PersonaError::MissingId {
                    path: path.display().to_string(),
                });
            }

            debug!(actor = %profile.id, path = %path.display(), "Loaded persona");
            store.insert(profile);
        }

        info!(count = store.len(), dir = %dir.display(), "Persona store loaded");
        Ok(store)
    }

    /// Add or replace a profile.
    pub fn insert(&mut self, profile: ActorProfile) {
        self.profiles.insert(profile.id.clone(), profile);
    }

    pub fn get(&self, actor_id: &str) -> Option<&ActorProfile> {
        self.profiles.get(actor_id)
    }

    pub fn contains(&self, actor_id: &str) -> bool {
        self.profiles.contains_key(actor_id)
    }

    /// Actor ids in sorted order.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.profiles.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mood_parse_and_display() {
        assert_eq!("Cheerful".parse::<Mood>(), Ok(Mood::Cheerful));
        assert_eq!(Mood::Dreamy.to_string(), "dreamy");
        assert!("furious".parse::<Mood>().is_err());
    }

    #[test]
    fn test_profile_json_defaults() {
        let json = r#"{"id": "npc-2", "display_name": "流羽岑", "mood": "cheerful"}"#;
        let profile: ActorProfile = serde_json::from_str(json).unwrap();

        assert_eq!(profile.mood, Mood::Cheerful);
        assert_eq!(profile.relationship_level, 0);
        assert!(profile.fallback_lines.is_empty());
        assert_eq!(profile.summary_line(), "流羽岑：友善的小鎮居民");
    }

    #[test]
    fn test_profile_rejects_unknown_mood() {
        let json = r#"{"id": "npc-2", "display_name": "x", "mood": "furious"}"#;
        assert!(serde_json::from_str::<ActorProfile>(json).is_err());
    }

    #[test]
    fn test_fallback_lines_keyed_by_mood() {
        let json = r#"{
            "id": "npc-1",
            "display_name": "鋁配咻",
            "fallback_lines": {"calm": ["讓我想想..."], "neutral": ["嗯..."]}
        }"#;
        let profile: ActorProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.fallback_lines[&Mood::Calm], vec!["讓我想想..."]);
    }

    #[tokio::test]
    async fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.json"),
            r#"{"id": "npc-1", "display_name": "A"}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let store = PersonaStore::load_dir(dir.path()).await.unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.contains("npc-1"));
    }

    #[tokio::test]
    async fn test_load_dir_reports_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();

        let err = PersonaStore::load_dir(dir.path()).await.unwrap_err();
        assert!(matches!(err, PersonaError::Json { .. }));
    }
}
