//! LLM integration for the survey bot.
//!
//! Supports:
//! - **Gemini**: direct REST access to `generateContent` via reqwest
//!
//! Every provider normalizes its output through `sanitize::clean_completion`
//! and reports failures as one `LlmError` variant.

pub mod gemini;
pub mod provider;
pub mod sanitize;

pub use gemini::GeminiProvider;
pub use provider::*;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::LlmError;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Gemini,
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
    /// Override for the provider endpoint, if any.
    pub base_url: Option<String>,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.backend {
        LlmBackend::Gemini => create_gemini_provider(config),
    }
}

fn create_gemini_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let mut provider = GeminiProvider::new(
        config.api_key.clone(),
        &config.model,
        config.temperature,
        config.timeout,
    )?;
    if let Some(ref url) = config.base_url {
        provider = provider.with_base_url(url);
    }
    tracing::info!("Using Gemini (model: {})", config.model);
    Ok(Arc::new(provider))
}

/// Stand-in used when no provider could be created at startup.
///
/// Every call fails with `LlmError::Auth` so the conversation replies with
/// the configuration apology and `/health` reports the model as down.
pub struct UnavailableProvider {
    model: String,
    reason: String,
}

impl UnavailableProvider {
    pub fn new(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl LlmProvider for UnavailableProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        Err(LlmError::Auth {
            provider: "unavailable".to_string(),
            reason: self.reason.clone(),
        })
    }
}
