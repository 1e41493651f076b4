//! Memory curation.
//!
//! Picks the turns of a conversation worth keeping long term. The backend
//! classifier is tried first; anything wrong with its reply (timeout, empty,
//! malformed, out of range) drops to the deterministic rules. Curation
//! itself never fails.

pub mod classifier;
pub mod rules;

pub use classifier::ClassifierError;
pub use rules::{score_turn, RuleScore};

use crate::backend::{invoke_with_deadline, GenerationBackend, GenerationRequest};
use crate::session::ConversationTurn;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Hard cap on candidates from any path.
pub const MAX_CANDIDATES: usize = 10;
/// Floor on the candidate bound for short conversations.
pub const MIN_CANDIDATES: usize = 3;

/// The most candidates curating `turn_count` turns may yield.
pub fn candidate_limit(turn_count: usize) -> usize {
    MIN_CANDIDATES.max(MAX_CANDIDATES.min(turn_count / 3))
}

/// Which path produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateSource {
    Classifier,
    Rules,
    /// Submitted directly through a memory update.
    Manual,
}

/// A turn judged worth remembering, with its scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryCandidate {
    pub turn: ConversationTurn,
    pub importance_score: f64,
    pub emotional_impact: f64,
    pub summary: String,
    pub keywords: Vec<String>,
    /// Selected by the classifier rather than the rules.
    pub promoted: bool,
    pub source: CandidateSource,
}

/// Curates conversations for one deployment.
pub struct MemoryCurator {
    backend: Arc<dyn GenerationBackend>,
    timeout: Duration,
}

impl MemoryCurator {
    pub fn new(backend: Arc<dyn GenerationBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Select memory candidates from `turns`, in original order.
    pub async fn curate(
        &self,
        actor_name: &str,
        turns: &[ConversationTurn],
    ) -> Vec<MemoryCandidate> {
        if turns.is_empty() {
            return Vec::new();
        }
        let limit = candidate_limit(turns.len());

        let prompt = classifier::build_prompt(actor_name, turns, limit);
        let outcome = invoke_with_deadline(
            self.backend.as_ref(),
            GenerationRequest::new(prompt).with_temperature(0.2),
            self.timeout,
        )
        .await;

        match outcome {
            Ok(raw) => match classifier::parse_reply(&raw, turns, limit) {
                Ok(candidates) => {
                    info!(
                        turns = turns.len(),
                        selected = candidates.len(),
                        "Classifier curated conversation"
                    );
                    return candidates;
                }
                Err(e) => warn!(error = %e, "Classifier reply rejected, using rules"),
            },
            Err(e) => warn!(error = %e, "Classifier unavailable, using rules"),
        }

        let candidates = rules::rule_candidates(turns, limit);
        debug!(
            turns = turns.len(),
            selected = candidates.len(),
            "Rules curated conversation"
        );
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedBackend, ScriptedReply};

    #[test]
    fn test_candidate_limit() {
        assert_eq!(candidate_limit(0), 3);
        assert_eq!(candidate_limit(6), 3);
        assert_eq!(candidate_limit(12), 4);
        assert_eq!(candidate_limit(30), 10);
        assert_eq!(candidate_limit(300), 10);
    }

    #[tokio::test]
    async fn test_empty_conversation_skips_backend() {
        let backend = Arc::new(ScriptedBackend::new([]));
        let curator = MemoryCurator::new(backend.clone(), Duration::from_secs(1));
        assert!(curator.curate("X", &[]).await.is_empty());
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_falls_back_to_rules() {
        let backend = Arc::new(ScriptedBackend::new([ScriptedReply::Hang]));
        let curator = MemoryCurator::new(backend.clone(), Duration::from_secs(30));
        let turns = vec![
            ConversationTurn::player("嗨"),
            ConversationTurn::player("這是我的秘密"),
        ];

        let out = curator.curate("X", &turns).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source, CandidateSource::Rules);
        assert!(!out[0].promoted);
    }
}
