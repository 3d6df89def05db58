//! Prompt construction and the fixed replies of the survey conversation.
//!
//! Everything here is pure string work; no model calls.

use crate::llm::ChatMessage;

use super::model::{ChatbotConfig, PromptParams};
use super::state::{Turn, TurnRole};

/// Literal the model must emit to end the conversation, and the reply the
/// service sends once every point has been covered.
pub const CONCLUSION_PHRASE: &str = "Thank you, that's helpful feedback on those points";

/// Reply to an empty message.
pub const EMPTY_PROMPT_REPLY: &str = "Please type a response.";

/// Turn 1 produced no usable pain points.
pub const CLARIFY_REPLY: &str = "Thanks for your feedback. Could you please tell me more about any specific challenges or pain points you experienced?";

/// Turn 1 extraction call failed.
pub const EXTRACTION_FAILED_REPLY: &str =
    "Sorry, I had trouble understanding the initial points due to an internal error.";

/// Follow-up generation failed.
pub const FOLLOW_UP_FAILED_REPLY: &str =
    "Sorry, I had trouble generating a follow-up due to an internal error.";

/// The provider refused to answer.
pub const BLOCKED_REPLY: &str =
    "Sorry, I can't respond to that. Could you rephrase your answer in a different way?";

/// The provider rejected our credentials. Worded differently from the other
/// apologies so misconfiguration is easy to spot in transcripts.
pub const UNAVAILABLE_REPLY: &str =
    "Sorry, the survey assistant is unavailable right now. Please try again later.";

/// Is this model output the conclusion signal?
///
/// Case-insensitive substring match on [`CONCLUSION_PHRASE`]. Keep every
/// conclusion check behind this function.
pub fn is_conclusion(text: &str) -> bool {
    text.to_lowercase()
        .contains(&CONCLUSION_PHRASE.to_lowercase())
}

// ── Extraction ──────────────────────────────────────────────────────────

/// Prompt asking the model to list the pain points in a free-text answer.
pub fn extraction_prompt(user_statement: &str) -> String {
    format!(
        "Analyze the user statement about product pain points. \
         List the distinct pain points mentioned as a comma-separated list \
         (e.g., price, usability, documentation). Use short noun phrases. \
         If none, respond 'NONE'.\n\
         User statement: \"{user_statement}\""
    )
}

/// Parse the extraction output into pain points.
///
/// `NONE` in any case, empty output, and output where no token survives
/// filtering all give an empty list. Tokens are trimmed, tokens of one
/// character or less are dropped, and duplicates keep their first position.
pub fn parse_pain_points(raw: &str) -> Vec<String> {
    let trimmed = raw.trim().trim_end_matches('.');
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return Vec::new();
    }

    let mut points: Vec<String> = Vec::new();
    for token in trimmed.split(',') {
        let point = token
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '*' || c == '.' || c == '-')
            .trim();
        if point.chars().count() <= 1 || point.eq_ignore_ascii_case("none") {
            continue;
        }
        if points.iter().any(|p| p.eq_ignore_ascii_case(point)) {
            continue;
        }
        points.push(point.to_string());
    }
    points
}

// ── Follow-up (point tracking) ──────────────────────────────────────────

/// Prompt for one follow-up question about `target`.
pub fn follow_up_prompt(all_points: &[String], target: &str, params: &PromptParams) -> String {
    let mut rules = vec![
        format!("Ask exactly ONE concise, open-ended follow-up question specifically about '{target}'."),
        "The question must not be answerable with yes or no.".to_string(),
        "Do not begin the question with Do, Have, Did, Is, Are, Was or Were.".to_string(),
        "Do not ask for personal data, feelings, willingness to pay, or numeric ratings."
            .to_string(),
        format!("Tone: {}. Depth: {}.", params.tone, params.depth),
    ];
    if !params.avoid_topics.is_empty() {
        rules.push(format!("Never bring up: {}.", params.avoid_topics.join(", ")));
    }
    rules.push("Reply with just the question, no preamble or extra text.".to_string());
    rules.push(format!(
        "If there is nothing left to ask about, reply with exactly: \"{CONCLUSION_PHRASE}\""
    ));

    let rule_lines: String = rules.iter().map(|r| format!("- {r}\n")).collect();

    format!(
        "You are following up on a product feedback survey.\n\
         The user initially mentioned these pain points: {points}.\n\
         You are now asking about '{target}'.\n\n\
         Rules:\n{rule_lines}",
        points = all_points.join(", "),
    )
}

// ── Guided mode ─────────────────────────────────────────────────────────

/// Rules-based system instruction for the history-driven mode.
pub fn guided_system_instruction(config: &ChatbotConfig) -> String {
    let params = &config.prompt_params;
    let focus = if params.focus_areas.is_empty() {
        "whatever pain points the respondent raises".to_string()
    } else {
        params.focus_areas.join(", ")
    };
    let avoid = if params.avoid_topics.is_empty() {
        "none".to_string()
    } else {
        params.avoid_topics.join(", ")
    };
    let limit = if params.max_follow_ups == 0 {
        "as many as are useful".to_string()
    } else {
        params.max_follow_ups.to_string()
    };

    format!(
        "You are a survey follow-up assistant embedded in a feedback form.\n\
         The respondent was first asked: \"{question}\"\n\n\
         Rules:\n\
         1. Read the whole conversation before replying.\n\
         2. Identify the distinct pain points the respondent has mentioned.\n\
         3. Ask about one pain point at a time, in the order they were raised.\n\
         4. Ask exactly ONE concise, open-ended question per reply.\n\
         5. Never ask a question that can be answered with yes or no.\n\
         6. Never begin a question with Do, Have, Did, Is, Are, Was or Were.\n\
         7. Never ask for personal data, feelings, willingness to pay, or numeric ratings.\n\
         8. Focus on: {focus}.\n\
         9. Avoid these topics: {avoid}.\n\
         10. Tone: {tone}.\n\
         11. Depth of probing: {depth}.\n\
         12. Ask at most {limit} follow-up questions in total.\n\
         13. Do not repeat a question that has already been answered.\n\
         14. Reply with just the question, no preamble, labels or quotation marks.\n\
         15. When every pain point has been covered, the limit is reached, or the respondent \
         has nothing more to add, reply with exactly: \"{CONCLUSION_PHRASE}\"",
        question = config.initial_question,
        tone = params.tone,
        depth = params.depth,
    )
}

/// Convert the transcript into model messages.
///
/// Leading model turns (the initial question shown to the respondent) stay
/// in the transcript but are not sent: the conversation must open with the
/// user, and the question is already in the system instruction.
pub fn history_for_model(history: &[Turn]) -> Vec<ChatMessage> {
    history
        .iter()
        .skip_while(|t| t.role == TurnRole::Model)
        .map(|t| match t.role {
            TurnRole::User => ChatMessage::user(&t.text),
            TurnRole::Model => ChatMessage::model(&t.text),
        })
        .collect()
}
