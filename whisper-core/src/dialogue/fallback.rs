//! Canned replies used when generation fails.

use crate::persona::{ActorProfile, Mood};
use rand::seq::SliceRandom;

const UNIVERSAL: &str = "嗯，我在聽呢。謝謝你告訴我這些。";

fn mood_defaults(mood: Mood) -> &'static [&'static str] {
    match mood {
        Mood::Cheerful | Mood::Happy => &[
            "哈哈，真有意思！再多說一點吧～",
            "聽你這麼說我也開心起來了！",
        ],
        Mood::Calm => &["嗯，我明白了。", "慢慢說，我在這裡。"],
        Mood::Warm => &["謝謝你願意跟我分享。", "有你在真好。"],
        Mood::Thoughtful => &["讓我想一想……", "這真是個值得思考的問題。"],
        Mood::Dreamy => &["像是夢裡的故事一樣呢……", "好想把這一刻畫下來。"],
        Mood::Sad => &["嗯……謝謝你陪著我。", "我會好好記住的。"],
        Mood::Neutral => &[UNIVERSAL],
    }
}

/// Pick a fallback line for an actor in a mood.
///
/// Tries the actor's own lines for the mood, then the actor's neutral lines,
/// then the shared per-mood table. Never returns an empty string.
pub fn pick_fallback(profile: &ActorProfile, mood: Mood) -> String {
    let mut rng = rand::thread_rng();

    let own = [mood, Mood::Neutral].into_iter().find_map(|m| {
        let lines: Vec<&String> = profile
            .fallback_lines
            .get(&m)?
            .iter()
            .filter(|l| !l.trim().is_empty())
            .collect();
        lines.choose(&mut rng).map(|l| l.to_string())
    });

    own.or_else(|| mood_defaults(mood).choose(&mut rng).map(|l| l.to_string()))
        .unwrap_or_else(|| UNIVERSAL.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_lines_preferred() {
        let profile =
            ActorProfile::new("npc-2", "流羽岑").with_fallback_lines(Mood::Cheerful, ["耶～"]);
        assert_eq!(pick_fallback(&profile, Mood::Cheerful), "耶～");
    }

    #[test]
    fn test_neutral_lines_cover_other_moods() {
        let profile =
            ActorProfile::new("npc-3", "沉停鞍").with_fallback_lines(Mood::Neutral, ["我在。"]);
        assert_eq!(pick_fallback(&profile, Mood::Dreamy), "我在。");
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let profile = ActorProfile::new("x", "X").with_fallback_lines(Mood::Calm, ["  "]);
        let line = pick_fallback(&profile, Mood::Calm);
        assert!(mood_defaults(Mood::Calm).contains(&line.as_str()));
    }

    #[test]
    fn test_never_empty_for_any_mood() {
        let profile = ActorProfile::new("bare", "Bare");
        for mood in Mood::ALL {
            assert!(!pick_fallback(&profile, mood).trim().is_empty());
        }
    }
}
