//! Cleanup applied to every model response before the policy sees it.

use std::sync::LazyLock;

use regex::Regex;

static SURROUNDING_QUOTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^[\s"'`]+|[\s"'`]+$"#).unwrap());

static ROLE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*\**\s*(assistant|model|ai|bot|chatbot|interviewer)\s*\**\s*:\s*\**\s*").unwrap()
});

/// Trim surrounding quote/space characters and strip a leading role-label
/// echo such as `Assistant:`. Returns `None` when nothing is left.
pub fn clean_completion(raw: &str) -> Option<String> {
    let text = SURROUNDING_QUOTES.replace_all(raw, "");
    let text = ROLE_LABEL.replace(&text, "");
    // The label may have sat outside a quoted question.
    let text = SURROUNDING_QUOTES.replace_all(&text, "");
    if text.is_empty() {
        None
    } else {
        Some(text.into_owned())
    }
}
