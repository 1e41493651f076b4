//! Cleanup of raw backend text before it is shown or cached.

const SENTENCE_ENDS: [char; 6] = ['。', '！', '？', '!', '?', '.'];
const ELLIPSIS: &str = "...";

/// Strip code fences and trim to at most `max_chars` visible characters.
///
/// Over-long text is cut after the last sentence end inside the limit; if
/// there is none, it is hard-truncated and an ellipsis appended.
pub fn clean_reply(raw: &str, max_chars: usize) -> String {
    let text = strip_fences(raw);
    let text = text.trim();

    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let head: String = text.chars().take(max_chars).collect();
    match head.rfind(SENTENCE_ENDS) {
        Some(idx) if idx > 0 => {
            let end = idx + head[idx..].chars().next().map_or(0, char::len_utf8);
            head[..end].to_string()
        }
        _ => format!("{}{ELLIPSIS}", head.trim_end()),
    }
}

/// Remove ``` fence lines, including a language tag on the opening fence.
fn strip_fences(raw: &str) -> String {
    if !raw.contains("```") {
        return raw.to_string();
    }
    raw.lines()
        .filter(|line| !is_fence_line(line))
        .collect::<Vec<_>>()
        .join("\n")
        .replace("```", "")
}

fn is_fence_line(line: &str) -> bool {
    line.trim()
        .strip_prefix("```")
        .is_some_and(|tag| tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
}
