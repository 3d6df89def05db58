//! Google Gemini provider — calls the `generateContent` REST endpoint.
//!
//! The wire response is interpreted here so the rest of the service only
//! ever sees cleaned text or one `LlmError` variant.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::provider::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role};
use super::sanitize::clean_completion;
use crate::error::LlmError;

const PROVIDER: &str = "gemini";

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Candidate finish reasons that mean the provider refused to answer.
const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
    "RECITATION",
];

/// Substrings of provider error text that point at a key or permission
/// problem rather than a transient failure.
const AUTH_MARKERS: &[&str] = &[
    "api key",
    "api_key",
    "permission",
    "unauthenticated",
    "unauthorized",
    "credential",
];

// ── Wire types ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

// ── Provider ────────────────────────────────────────────────────────────

/// Gemini `generateContent` client.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    base_url: String,
    temperature: f32,
}

impl GeminiProvider {
    pub fn new(
        api_key: SecretString,
        model: impl Into<String>,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Unknown {
                provider: PROVIDER.to_string(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            api_key,
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature,
        })
    }

    /// Point the client at another endpoint (proxies, regional hosts).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn build_body(&self, request: &CompletionRequest) -> GenerateContentRequest {
        let contents = request
            .conversation()
            .map(|m| Content {
                role: Some(match m.role {
                    Role::Model => "model".to_string(),
                    _ => "user".to_string(),
                }),
                parts: vec![Part {
                    text: Some(m.content.clone()),
                }],
            })
            .collect();

        let system_instruction = request.system_instruction().map(|text| Content {
            role: None,
            parts: vec![Part { text: Some(text) }],
        });

        GenerateContentRequest {
            contents,
            system_instruction,
            generation_config: GenerationConfig {
                temperature: request.temperature.unwrap_or(self.temperature),
                max_output_tokens: request.max_tokens,
            },
        }
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_body(&request);
        debug!(
            model = %self.model,
            messages = body.contents.len(),
            has_system = body.system_instruction.is_some(),
            "Sending Gemini request"
        );

        let resp = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Api {
                provider: PROVIDER.to_string(),
                status: e.status().map(|s| s.as_u16()),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| LlmError::Api {
            provider: PROVIDER.to_string(),
            status: Some(status.as_u16()),
            reason: format!("Failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            let message = match serde_json::from_str::<ErrorEnvelope>(&text) {
                Ok(envelope) => format!("{} {}", envelope.error.status, envelope.error.message),
                Err(_) => text,
            };
            let err = classify_api_error(status.as_u16(), message.trim());
            warn!(status = status.as_u16(), kind = err.kind(), "Gemini request failed");
            return Err(err);
        }

        let parsed: GenerateContentResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::Unknown {
                provider: PROVIDER.to_string(),
                reason: format!("Failed to decode response: {e}"),
            })?;

        interpret_response(parsed)
    }
}

// ── Response interpretation ─────────────────────────────────────────────

/// Map a non-success HTTP status and provider error text to an error kind.
///
/// Gemini reports an invalid key as a 400, so the text is checked as well
/// as the status.
pub fn classify_api_error(status: u16, message: &str) -> LlmError {
    let lowered = message.to_lowercase();
    let auth_text = AUTH_MARKERS.iter().any(|m| lowered.contains(m));
    if status == 401 || status == 403 || auth_text {
        return LlmError::Auth {
            provider: PROVIDER.to_string(),
            reason: message.to_string(),
        };
    }
    LlmError::Api {
        provider: PROVIDER.to_string(),
        status: Some(status),
        reason: message.to_string(),
    }
}

fn interpret_response(resp: GenerateContentResponse) -> Result<CompletionResponse, LlmError> {
    if let Some(reason) = resp
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.clone())
    {
        return Err(LlmError::Blocked {
            provider: PROVIDER.to_string(),
            reason,
        });
    }

    let Some(candidate) = resp.candidates.into_iter().next() else {
        return Err(LlmError::Blocked {
            provider: PROVIDER.to_string(),
            reason: "no candidates returned".to_string(),
        });
    };

    let raw: String = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let finish = candidate.finish_reason.unwrap_or_default();
    // A refusal or a truncated answer never reaches the respondent, even
    // when some text came back with it.
    if BLOCKING_FINISH_REASONS.contains(&finish.as_str()) {
        return Err(LlmError::Blocked {
            provider: PROVIDER.to_string(),
            reason: finish,
        });
    }
    if raw.is_empty() || finish == "MAX_TOKENS" {
        return Err(LlmError::NoResponse {
            provider: PROVIDER.to_string(),
        });
    }

    let content = clean_completion(&raw).ok_or_else(|| LlmError::EmptyText {
        provider: PROVIDER.to_string(),
    })?;

    let finish_reason = match finish.as_str() {
        "STOP" | "" => FinishReason::Stop,
        _ => FinishReason::Other,
    };
    let (input_tokens, output_tokens) = resp
        .usage_metadata
        .map(|u| (u.prompt_token_count, u.candidates_token_count))
        .unwrap_or((0, 0));

    Ok(CompletionResponse {
        content,
        input_tokens,
        output_tokens,
        finish_reason,
    })
}
