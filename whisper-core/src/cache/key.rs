//! Cache key normalization.
//!
//! High-frequency small talk is folded onto a handful of canonical phrases
//! before hashing, so "Hi!!", "hello" and "你好～" all share one cache slot.

use crate::persona::Mood;
use sha2::{Digest, Sha256};

/// Canonical greeting.
const CANON_GREETING: &str = "你好";
/// Canonical "how have you been".
const CANON_HOW_ARE_YOU: &str = "最近怎麼樣";
/// Canonical "what do you like".
const CANON_WHAT_DO_YOU_LIKE: &str = "你喜歡什麼";

/// Greeting markers matched as substrings.
const CJK_GREETINGS: &[&str] = &["你好", "您好", "哈囉", "嗨"];

/// Greeting markers matched as whole words.
const LATIN_GREETINGS: &[&str] = &["hi", "hello", "hey", "hiya", "howdy"];

const HOW_MARKERS: &[&str] = &["怎麼樣", "如何", "好嗎", "還好嗎"];
const WHEN_MARKERS: &[&str] = &["最近", "今天"];
const LATIN_HOW_ARE_YOU: &[&str] = &[
    "how are you",
    "how are you doing",
    "how have you been",
    "hows it going",
    "how is it going",
    "whats up",
];

const LIKE_MARKERS: &[&str] = &["喜歡"];
const WHAT_MARKERS: &[&str] = &["什麼", "啥"];
const LATIN_WHAT_DO_YOU_LIKE: &[&str] = &["what do you like", "what do you enjoy"];

/// Punctuation stripped in addition to ASCII punctuation.
const CJK_PUNCTUATION: &[char] = &[
    '！', '？', '。', '，', '、', '～', '；', '：', '「', '」', '『', '』', '（', '）', '…', '—',
    '·', '“', '”', '‘', '’', '《', '》',
];

/// Request fields that select a distinct reply for the same message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyContext {
    pub mood: Mood,
    pub relationship_level: u8,
}

/// Lowercase, strip punctuation and collapse whitespace runs.
pub fn clean_message(raw: &str) -> String {
    let stripped: String = raw
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| !c.is_ascii_punctuation() && !CJK_PUNCTUATION.contains(c))
        .collect();

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Clean a message and fold common small talk onto canonical phrases.
pub fn normalize_message(raw: &str) -> String {
    let msg = clean_message(raw);
    let words: Vec<&str> = msg.split(' ').collect();

    let is_greeting = CJK_GREETINGS.iter().any(|g| msg.contains(g))
        || words.iter().any(|w| LATIN_GREETINGS.contains(w));
    if is_greeting {
        return CANON_GREETING.to_string();
    }

    let asks_how = HOW_MARKERS.iter().any(|m| msg.contains(m))
        && WHEN_MARKERS.iter().any(|m| msg.contains(m));
    if asks_how || LATIN_HOW_ARE_YOU.contains(&msg.as_str()) {
        return CANON_HOW_ARE_YOU.to_string();
    }

    let asks_likes = LIKE_MARKERS.iter().any(|m| msg.contains(m))
        && WHAT_MARKERS.iter().any(|m| msg.contains(m));
    if asks_likes || LATIN_WHAT_DO_YOU_LIKE.contains(&msg.as_str()) {
        return CANON_WHAT_DO_YOU_LIKE.to_string();
    }

    msg
}

/// Derive the cache key for a request.
///
/// The key is `namespace` followed by the hex SHA-256 of the actor id, the
/// normalized message and the mood/relationship context. Inputs of any
/// length hash to a fixed-size key.
pub fn cache_key(
    namespace: &str,
    actor_id: &str,
    raw_message: &str,
    context: KeyContext,
) -> String {
    let normalized = normalize_message(raw_message);

    let mut hasher = Sha256::new();
    // Length prefixes keep ("ab", "c") distinct from ("a", "bc").
    for field in [actor_id, normalized.as_str(), context.mood.as_str()] {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    hasher.update([context.relationship_level]);

    format!("{namespace}{}", hex::encode(hasher.finalize()))
}
