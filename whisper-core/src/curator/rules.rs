//! Deterministic rule-based scoring.

use super::{CandidateSource, MemoryCandidate};
use crate::session::ConversationTurn;

/// Words that mark a turn as emotionally salient.
pub const SALIENT_KEYWORDS: &[&str] = &[
    "喜歡", "愛", "討厭", "重要", "秘密", "約定", "承諾", "夢想", "希望", "難過", "開心",
    "promise", "secret", "dream", "important", "love", "hate",
];

const POSITIVE_EMOTIONS: &[&str] = &["happy", "joy", "excited"];
const NEGATIVE_EMOTIONS: &[&str] = &["sad", "angry", "worried"];

/// Turns longer than this (in chars) count as deep.
pub const LONG_TEXT_CHARS: usize = 50;

const SUMMARY_CHARS: usize = 30;

/// Scores a turn earned from the rules that matched it.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleScore {
    pub importance_score: f64,
    pub emotional_impact: f64,
    pub keywords: Vec<String>,
}

/// Score one turn. `None` means no rule matched.
///
/// Each matching rule sets a floor; the result is the maximum across rules.
pub fn score_turn(turn: &ConversationTurn) -> Option<RuleScore> {
    let text = turn.text.to_lowercase();
    let mut importance: f64 = 0.0;
    let mut impact: f64 = 0.0;
    let mut matched = false;

    if let Some(emotion) = turn.emotion.as_deref().map(str::to_lowercase) {
        if NEGATIVE_EMOTIONS.contains(&emotion.as_str()) {
            importance = importance.max(0.8);
            impact = impact.max(0.7);
            matched = true;
        } else if POSITIVE_EMOTIONS.contains(&emotion.as_str()) {
            importance = importance.max(0.7);
            impact = impact.max(0.6);
            matched = true;
        }
    }

    let keywords: Vec<String> = SALIENT_KEYWORDS
        .iter()
        .filter(|k| text.contains(*k))
        .map(|k| k.to_string())
        .collect();
    if !keywords.is_empty() {
        importance = importance.max(0.7);
        impact = impact.max(0.5);
        matched = true;
    }

    if turn.text.chars().count() > LONG_TEXT_CHARS {
        importance = importance.max(0.6);
        matched = true;
    }

    matched.then_some(RuleScore {
        importance_score: importance,
        emotional_impact: impact,
        keywords,
    })
}

/// Short summary: "關於：" plus the opening of the text.
pub fn summarize(text: &str) -> String {
    let text = text.trim();
    let head: String = text.chars().take(SUMMARY_CHARS).collect();
    if head.len() < text.len() {
        format!("關於：{head}...")
    } else {
        format!("關於：{head}")
    }
}

/// Rule-based selection, at most `limit` candidates, in original order.
///
/// When more turns qualify, the highest importance wins and ties go to the
/// earlier turn.
pub fn rule_candidates(turns: &[ConversationTurn], limit: usize) -> Vec<MemoryCandidate> {
    let mut scored: Vec<(usize, RuleScore)> = turns
        .iter()
        .enumerate()
        .filter_map(|(i, turn)| score_turn(turn).map(|s| (i, s)))
        .collect();

    if scored.len() > limit {
        scored.sort_by(|(ia, a), (ib, b)| {
            b.importance_score
                .total_cmp(&a.importance_score)
                .then(ia.cmp(ib))
        });
        scored.truncate(limit);
        scored.sort_by_key(|(i, _)| *i);
    }

    scored
        .into_iter()
        .map(|(i, score)| MemoryCandidate {
            turn: turns[i].clone(),
            importance_score: score.importance_score,
            emotional_impact: score.emotional_impact,
            summary: summarize(&turns[i].text),
            keywords: score.keywords,
            promoted: false,
            source: CandidateSource::Rules,
        })
        .collect()
}
