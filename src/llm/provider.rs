//! Provider-agnostic request/response types and the `LlmProvider` trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Model,
}

/// A single message sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            content: content.into(),
        }
    }
}

/// A completion request.
///
/// The model is stateless between calls, so chat-style requests carry the
/// whole history every time. System messages anywhere in `messages` are
/// joined into the provider's system instruction.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Single-shot request: one user prompt, no history.
    pub fn single(prompt: impl Into<String>) -> Self {
        Self::new(vec![ChatMessage::user(prompt)])
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// All system messages joined, or `None` if there are none.
    pub fn system_instruction(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }

    /// The conversational (non-system) messages in order.
    pub fn conversation(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter().filter(|m| m.role != Role::System)
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    /// Finished for a reason that still produced usable text.
    Other,
}

/// A successful completion. `content` is already cleaned and non-empty.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub finish_reason: FinishReason,
}

/// A generative text model.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Model identifier, for logs and the health endpoint.
    fn model_name(&self) -> &str;

    /// Run a completion. Every failure maps to one `LlmError` variant; a
    /// provider never returns partial text alongside an error.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_messages_are_joined() {
        let request = CompletionRequest::new(vec![
            ChatMessage::system("rule one"),
            ChatMessage::user("hello"),
            ChatMessage::system("rule two"),
        ]);
        assert_eq!(
            request.system_instruction().as_deref(),
            Some("rule one\n\nrule two")
        );
        let convo: Vec<_> = request.conversation().collect();
        assert_eq!(convo.len(), 1);
        assert_eq!(convo[0].content, "hello");
    }

    #[test]
    fn single_shot_has_no_system_instruction() {
        let request = CompletionRequest::single("prompt").with_temperature(0.2);
        assert!(request.system_instruction().is_none());
        assert_eq!(request.temperature, Some(0.2));
        assert_eq!(request.messages[0].role, Role::User);
    }
}
