//! Prompt assembly for actor replies.

use crate::config::PromptRichness;
use crate::persona::{ActorProfile, Mood};
use crate::session::{ConversationTurn, Speaker};

/// Everything that goes into one reply prompt.
#[derive(Debug, Clone)]
pub struct PromptInput<'a> {
    pub profile: &'a ActorProfile,
    pub mood: Mood,
    pub relationship_level: u8,
    pub history: &'a [ConversationTurn],
    pub memories: &'a [String],
    pub message: &'a str,
}

/// Limits applied while building a prompt.
#[derive(Debug, Clone, Copy)]
pub struct PromptLimits {
    pub history_turns: usize,
    pub memories: usize,
}

/// Build the prompt for the configured richness.
pub fn build_prompt(
    input: &PromptInput<'_>,
    richness: PromptRichness,
    limits: PromptLimits,
) -> String {
    match richness {
        PromptRichness::Full => build_full(input, limits),
        PromptRichness::Minimal => build_minimal(input),
    }
}

fn build_full(input: &PromptInput<'_>, limits: PromptLimits) -> String {
    let profile = input.profile;
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "你是「{}」，一位住在心語小鎮的角色。請完全以這個角色的身分回覆玩家。\n\n",
        profile.display_name
    ));

    prompt.push_str("## 規則\n");
    prompt.push_str("- 保持角色，不要提到你是 AI 或模型\n");
    prompt.push_str("- 回覆 1 到 3 句簡短的話\n");
    prompt.push_str("- 使用玩家所用的語言回覆\n");
    prompt.push_str(&format!("- 語氣：{}\n", input.mood.tone()));
    prompt.push_str("- 只輸出角色說的話，不要加旁白或格式\n\n");

    prompt.push_str("## 角色設定\n");
    if !profile.personality.is_empty() {
        prompt.push_str(&format!("個性：{}\n", profile.personality));
    }
    if !profile.background.is_empty() {
        prompt.push_str(&format!("背景：{}\n", profile.background));
    }
    if let Some(style) = &profile.chat_style {
        prompt.push_str(&format!("說話風格：{style}\n"));
    }
    prompt.push_str(&format!("目前心情：{}\n", input.mood));
    prompt.push_str(&format!("與玩家的關係等級：{}/10\n", input.relationship_level));

    let skip = input.history.len().saturating_sub(limits.history_turns);
    let history = &input.history[skip..];
    if !history.is_empty() {
        prompt.push_str("\n## 最近的對話\n");
        for turn in history {
            let who = match turn.speaker {
                Speaker::Player => "玩家",
                Speaker::Actor => profile.display_name.as_str(),
            };
            prompt.push_str(&format!("{who}：{}\n", turn.text));
        }
    }

    let memories: Vec<&String> = input
        .memories
        .iter()
        .filter(|m| !m.trim().is_empty())
        .take(limits.memories)
        .collect();
    if !memories.is_empty() {
        prompt.push_str("\n## 相關記憶\n");
        for memory in memories {
            prompt.push_str(&format!("- {}\n", memory.trim()));
        }
    }

    prompt.push_str(&format!("\n玩家說：{}\n", input.message));
    prompt.push_str(&format!("{}：", profile.display_name));
    prompt
}

fn build_minimal(input: &PromptInput<'_>) -> String {
    format!(
        "{}\n玩家說：{}\n請用一句話回覆。",
        input.profile.summary_line(),
        input.message
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> ActorProfile {
        ActorProfile::new("npc-1", "鋁配咻")
            .with_personality("安靜的藝術家")
            .with_background("在湖邊畫畫")
            .with_tagline("鋁配咻：喜歡畫畫的藝術家")
    }

    const LIMITS: PromptLimits = PromptLimits {
        history_turns: 5,
        memories: 3,
    };

    #[test]
    fn test_full_prompt_contains_persona_and_message() {
        let profile = profile();
        let input = PromptInput {
            profile: &profile,
            mood: Mood::Calm,
            relationship_level: 4,
            history: &[],
            memories: &[],
            message: "你好",
        };
        let prompt = build_prompt(&input, PromptRichness::Full, LIMITS);

        assert!(prompt.contains("鋁配咻"));
        assert!(prompt.contains("安靜的藝術家"));
        assert!(prompt.contains(Mood::Calm.tone()));
        assert!(prompt.contains("4/10"));
        assert!(prompt.contains("玩家說：你好"));
        assert!(!prompt.contains("最近的對話"));
    }

    #[test]
    fn test_full_prompt_caps_history_and_memories() {
        let profile = profile();
        let history: Vec<_> = (0..8)
            .map(|i| ConversationTurn::player(format!("line {i}")))
            .collect();
        let memories: Vec<String> = (0..6).map(|i| format!("memory {i}")).collect();
        let input = PromptInput {
            profile: &profile,
            mood: Mood::Warm,
            relationship_level: 1,
            history: &history,
            memories: &memories,
            message: "hi",
        };
        let prompt = build_prompt(&input, PromptRichness::Full, LIMITS);

        assert!(!prompt.contains("line 2"));
        assert!(prompt.contains("line 3"));
        assert!(prompt.contains("line 7"));
        assert!(prompt.contains("memory 2"));
        assert!(!prompt.contains("memory 3"));
    }

    #[test]
    fn test_minimal_prompt() {
        let profile = profile();
        let input = PromptInput {
            profile: &profile,
            mood: Mood::Neutral,
            relationship_level: 0,
            history: &[ConversationTurn::player("ignored")],
            memories: &["ignored too".to_string()],
            message: "你好",
        };
        let prompt = build_prompt(&input, PromptRichness::Minimal, LIMITS);

        assert!(prompt.starts_with("鋁配咻：喜歡畫畫的藝術家"));
        assert!(prompt.contains("你好"));
        assert!(!prompt.contains("ignored"));
    }
}
