//! Backend-assisted classification: prompt building and strict reply parsing.

use super::{CandidateSource, MemoryCandidate};
use crate::session::ConversationTurn;
use serde::Deserialize;
use std::collections::HashSet;
use thiserror::Error;

/// Why a classifier reply was rejected.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Empty classifier reply")]
    Empty,

    #[error("Malformed classifier reply: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Selected index {index} outside 1..={len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Index {0} selected twice")]
    DuplicateIndex(usize),

    #[error("Score {field} for index {index} outside [0, 1]")]
    ScoreOutOfRange { index: usize, field: &'static str },
}

#[derive(Debug, Deserialize)]
struct ClassifierReply {
    selected_conversations: Vec<Selection>,
}

#[derive(Debug, Deserialize)]
struct Selection {
    /// 1-based position in the prompt listing.
    index: usize,
    importance_score: f64,
    emotional_impact: f64,
    summary: String,
    #[serde(default)]
    keywords: Vec<String>,
}

/// Build the classification prompt for `turns`.
pub fn build_prompt(actor_name: &str, turns: &[ConversationTurn], limit: usize) -> String {
    let mut listing = String::new();
    for (i, turn) in turns.iter().enumerate() {
        let speaker = match turn.speaker {
            crate::session::Speaker::Player => "玩家",
            crate::session::Speaker::Actor => actor_name,
        };
        let emotion = turn.emotion.as_deref().unwrap_or("neutral");
        listing.push_str(&format!(
            "{}. [{}] {speaker}（情緒：{emotion}）：{}\n",
            i + 1,
            turn.timestamp.format("%Y-%m-%d %H:%M"),
            turn.text
        ));
    }

    format!(
        r#"你正在替角色「{actor_name}」整理與玩家的對話，挑出值得長期記住的片段。

## 對話
{listing}
## 評分標準（由高到低）
1. 強烈情緒、明確的約定或承諾、透露的個人資訊、關係的重要轉折、深入或關於價值觀的討論
2. 有趣但較淺的交流
3. 打招呼與閒聊

## 指示
最多挑選 {limit} 則對話。只輸出 JSON，格式如下：
```json
{{
  "selected_conversations": [
    {{
      "index": 1,
      "importance_score": 0.9,
      "emotional_impact": 0.8,
      "summary": "一句話摘要",
      "keywords": ["關鍵字"]
    }}
  ]
}}
```
index 是上面對話的編號，分數介於 0 到 1。沒有值得記住的對話時回傳空陣列。"#
    )
}

/// Pull JSON out of a reply that may wrap it in a code fence.
pub fn extract_json(text: &str) -> &str {
    let text = text.trim();

    if let Some(start) = text.find("```json") {
        let content_start = start + 7;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        let content_start = start + 3;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    text
}

/// Parse a classifier reply into candidates.
///
/// Any schema violation rejects the whole reply. Over-long selections keep
/// the `limit` highest importance scores. Output is in original turn order.
pub fn parse_reply(
    raw: &str,
    turns: &[ConversationTurn],
    limit: usize,
) -> Result<Vec<MemoryCandidate>, ClassifierError> {
    let json = extract_json(raw);
    if json.is_empty() {
        return Err(ClassifierError::Empty);
    }

    let reply: ClassifierReply = serde_json::from_str(json)?;

    let mut seen = HashSet::new();
    for sel in &reply.selected_conversations {
        if sel.index == 0 || sel.index > turns.len() {
            return Err(ClassifierError::IndexOutOfRange {
                index: sel.index,
                len: turns.len(),
            });
        }
        if !seen.insert(sel.index) {
            return Err(ClassifierError::DuplicateIndex(sel.index));
        }
        for (field, value) in [
            ("importance_score", sel.importance_score),
            ("emotional_impact", sel.emotional_impact),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ClassifierError::ScoreOutOfRange {
                    index: sel.index,
                    field,
                });
            }
        }
    }

    let mut selections = reply.selected_conversations;
    if selections.len() > limit {
        selections.sort_by(|a, b| {
            b.importance_score
                .total_cmp(&a.importance_score)
                .then(a.index.cmp(&b.index))
        });
        selections.truncate(limit);
    }
    selections.sort_by_key(|s| s.index);

    Ok(selections
        .into_iter()
        .map(|sel| MemoryCandidate {
            turn: turns[sel.index - 1].clone(),
            importance_score: sel.importance_score,
            emotional_impact: sel.emotional_impact,
            summary: sel.summary,
            keywords: sel.keywords,
            promoted: true,
            source: CandidateSource::Classifier,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn turns(n: usize) -> Vec<ConversationTurn> {
        (0..n)
            .map(|i| ConversationTurn::player(format!("turn {i}")))
            .collect()
    }

    fn selection(index: usize, importance: f64) -> String {
        format!(
            r#"{{"index": {index}, "importance_score": {importance}, "emotional_impact": 0.5, "summary": "s{index}", "keywords": ["k"]}}"#
        )
    }

    #[test]
    fn test_extract_json_plain() {
        let text = r#"{"selected_conversations": []}"#;
        assert_eq!(extract_json(text), text);
    }

    #[test]
    fn test_extract_json_fenced() {
        let text = "Here you go:\n```json\n{\"selected_conversations\": []}\n```";
        assert_eq!(extract_json(text), r#"{"selected_conversations": []}"#);
    }

    #[test]
    fn test_parse_orders_by_turn() {
        let raw = format!(
            r#"{{"selected_conversations": [{}, {}]}}"#,
            selection(3, 0.9),
            selection(1, 0.4)
        );
        let out = parse_reply(&raw, &turns(4), 3).unwrap();
        let texts: Vec<_> = out.iter().map(|c| c.turn.text.as_str()).collect();
        assert_eq!(texts, vec!["turn 0", "turn 2"]);
        assert!(out.iter().all(|c| c.promoted));
        assert_eq!(out[1].summary, "s3");
    }

    #[test]
    fn test_parse_truncates_to_limit_by_score() {
        let raw = format!(
            r#"{{"selected_conversations": [{}, {}, {}, {}]}}"#,
            selection(1, 0.2),
            selection(2, 0.9),
            selection(3, 0.5),
            selection(4, 0.8)
        );
        let out = parse_reply(&raw, &turns(6), 3).unwrap();
        let texts: Vec<_> = out.iter().map(|c| c.turn.text.as_str()).collect();
        assert_eq!(texts, vec!["turn 1", "turn 2", "turn 3"]);
    }

    #[test]
    fn test_empty_selection_is_valid() {
        let out = parse_reply(r#"{"selected_conversations": []}"#, &turns(3), 3).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_rejects_bad_replies() {
        let t = turns(3);
        assert!(matches!(parse_reply("   ", &t, 3), Err(ClassifierError::Empty)));
        assert!(matches!(
            parse_reply("not json at all", &t, 3),
            Err(ClassifierError::Malformed(_))
        ));
        assert!(matches!(
            parse_reply(r#"{"something_else": []}"#, &t, 3),
            Err(ClassifierError::Malformed(_))
        ));

        let out_of_range = format!(r#"{{"selected_conversations": [{}]}}"#, selection(4, 0.5));
        assert!(matches!(
            parse_reply(&out_of_range, &t, 3),
            Err(ClassifierError::IndexOutOfRange { index: 4, len: 3 })
        ));

        let zero = format!(r#"{{"selected_conversations": [{}]}}"#, selection(0, 0.5));
        assert!(matches!(
            parse_reply(&zero, &t, 3),
            Err(ClassifierError::IndexOutOfRange { index: 0, .. })
        ));

        let dup = format!(
            r#"{{"selected_conversations": [{}, {}]}}"#,
            selection(2, 0.5),
            selection(2, 0.6)
        );
        assert!(matches!(
            parse_reply(&dup, &t, 3),
            Err(ClassifierError::DuplicateIndex(2))
        ));

        let score = format!(r#"{{"selected_conversations": [{}]}}"#, selection(1, 1.5));
        assert!(matches!(
            parse_reply(&score, &t, 3),
            Err(ClassifierError::ScoreOutOfRange { index: 1, field: "importance_score" })
        ));
    }

    #[test]
    fn test_prompt_lists_turns() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
        let t = vec![
            ConversationTurn::player("我們約定了")
                .with_emotion("happy")
                .with_timestamp(at),
            ConversationTurn::actor("嗯"),
        ];
        let prompt = build_prompt("流羽岑", &t, 3);
        assert!(prompt.contains("1. [2024-03-09 14:05] 玩家"));
        assert!(prompt.contains("2. ["));
        assert!(prompt.contains("玩家（情緒：happy）：我們約定了"));
        assert!(prompt.contains("流羽岑（情緒：neutral）：嗯"));
        assert!(prompt.contains("最多挑選 3 則"));
    }
}
