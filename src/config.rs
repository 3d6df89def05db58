//! Service configuration, read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};
use crate::survey::model::ConversationMode;

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash-latest";

/// Everything `main` needs to start the service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// `GEMINI_API_KEY`. Without it the service starts with the model marked down.
    pub gemini_api_key: Option<SecretString>,
    pub gemini_base_url: Option<String>,
    pub model: String,
    pub temperature: f32,
    /// reqwest client timeout for model calls.
    pub llm_timeout: Duration,
    pub port: u16,
    pub db_path: PathBuf,
    pub mode: ConversationMode,
    pub cors_origins: Vec<String>,
    pub static_dir: PathBuf,
    /// Optional JSON file with the initial chatbot configuration.
    pub chatbot_config_path: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_base_url: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.6,
            llm_timeout: Duration::from_secs(60),
            port: 8080,
            db_path: PathBuf::from("./data/survey-followup.db"),
            mode: ConversationMode::default(),
            cors_origins: vec!["*".to_string()],
            static_dir: PathBuf::from("./static"),
            chatbot_config_path: None,
        }
    }
}

impl ServiceConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from any key lookup. Unparseable numbers fall back to
    /// their defaults; an unknown mode or out-of-range temperature is an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let temperature: f32 = non_empty("SURVEY_TEMPERATURE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.temperature);
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::InvalidValue {
                key: "SURVEY_TEMPERATURE".to_string(),
                message: format!("{temperature} is outside 0.0..=2.0"),
            });
        }

        let mode = match non_empty("SURVEY_MODE") {
            Some(raw) => raw
                .parse::<ConversationMode>()
                .map_err(|message| ConfigError::InvalidValue {
                    key: "SURVEY_MODE".to_string(),
                    message,
                })?,
            None => defaults.mode,
        };

        let llm_timeout = non_empty("SURVEY_LLM_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.llm_timeout);

        let port: u16 = non_empty("SURVEY_PORT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.port);

        let cors_origins: Vec<String> = match non_empty("SURVEY_CORS_ORIGINS") {
            Some(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => defaults.cors_origins,
        };

        Ok(Self {
            gemini_api_key: non_empty("GEMINI_API_KEY").map(SecretString::from),
            gemini_base_url: non_empty("SURVEY_GEMINI_BASE_URL"),
            model: non_empty("SURVEY_MODEL").unwrap_or(defaults.model),
            temperature,
            llm_timeout,
            port,
            db_path: non_empty("SURVEY_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            mode,
            cors_origins,
            static_dir: non_empty("SURVEY_STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.static_dir),
            chatbot_config_path: non_empty("SURVEY_CHATBOT_CONFIG").map(PathBuf::from),
        })
    }

    /// Provider settings, or `None` when no API key is configured.
    pub fn llm_config(&self) -> Option<LlmConfig> {
        let api_key = self.gemini_api_key.clone()?;
        Some(LlmConfig {
            backend: LlmBackend::Gemini,
            api_key,
            model: self.model.clone(),
            temperature: self.temperature,
            timeout: self.llm_timeout,
            base_url: self.gemini_base_url.clone(),
        })
    }
}
