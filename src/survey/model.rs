//! Chatbot configuration: the process-wide settings an operator posts to
//! `/config`.

use serde::{Deserialize, Serialize};

/// Question shown as the bot's first turn when nothing else is configured.
pub const DEFAULT_INITIAL_QUESTION: &str =
    "What challenges or pain points have you experienced with our product?";

/// How the conversation is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationMode {
    /// Extract pain points at turn 1 and ask about each in order.
    #[default]
    PointTracking,
    /// Hand the model a rules-based system instruction plus the full history
    /// and let it decide when to conclude.
    Guided,
}

impl std::str::FromStr for ConversationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "points" | "point_tracking" | "tracking" => Ok(Self::PointTracking),
            "guided" | "history" | "prompt" => Ok(Self::Guided),
            other => Err(format!("unknown conversation mode '{other}'")),
        }
    }
}

/// Knobs for the follow-up questions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PromptParams {
    /// Follow-up questions before concluding. 0 means no limit.
    pub max_follow_ups: u32,
    pub focus_areas: Vec<String>,
    pub avoid_topics: Vec<String>,
    pub tone: String,
    pub depth: String,
}

impl Default for PromptParams {
    fn default() -> Self {
        Self {
            max_follow_ups: 5,
            focus_areas: Vec::new(),
            avoid_topics: Vec::new(),
            tone: "friendly and professional".to_string(),
            depth: "moderate".to_string(),
        }
    }
}

impl PromptParams {
    /// Whether `asked` follow-ups already use up the allowance.
    pub fn follow_up_limit_reached(&self, asked: usize) -> bool {
        self.max_follow_ups > 0 && asked >= self.max_follow_ups as usize
    }
}

/// Process-wide chatbot configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatbotConfig {
    pub initial_question: String,
    pub prompt_params: PromptParams,
    /// Opaque settings for the embedding page (colors, titles, ...).
    pub ui_config: serde_json::Value,
}

impl Default for ChatbotConfig {
    fn default() -> Self {
        Self {
            initial_question: DEFAULT_INITIAL_QUESTION.to_string(),
            prompt_params: PromptParams::default(),
            ui_config: serde_json::json!({}),
        }
    }
}

impl ChatbotConfig {
    /// Reject configurations the prompts cannot work with.
    pub fn validate(&self) -> Result<(), String> {
        if self.initial_question.trim().is_empty() {
            return Err("initialQuestion must not be empty".to_string());
        }
        if !self.ui_config.is_object() && !self.ui_config.is_null() {
            return Err("uiConfig must be an object".to_string());
        }
        Ok(())
    }
}
