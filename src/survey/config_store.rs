//! Process-wide chatbot configuration with single-writer replacement.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::store::SessionRepository;

use super::model::ChatbotConfig;

/// Settings key the configuration is persisted under.
pub const CHATBOT_CONFIG_KEY: &str = "chatbot_config";

/// Holds the current [`ChatbotConfig`].
///
/// Readers take an `Arc` snapshot once per request; writers swap the whole
/// value, so a request never sees a half-applied update.
pub struct ConfigStore {
    current: RwLock<Arc<ChatbotConfig>>,
    repo: Arc<dyn SessionRepository>,
}

impl ConfigStore {
    pub fn new(initial: ChatbotConfig, repo: Arc<dyn SessionRepository>) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
            repo,
        }
    }

    /// Build the store at startup.
    ///
    /// Precedence: the persisted setting, then the seed file, then defaults.
    pub async fn load(
        repo: Arc<dyn SessionRepository>,
        seed_path: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        match repo.get_setting(CHATBOT_CONFIG_KEY).await {
            Ok(Some(value)) => match serde_json::from_value::<ChatbotConfig>(value) {
                Ok(config) if config.validate().is_ok() => {
                    info!("Loaded chatbot configuration from settings");
                    return Ok(Self::new(config, repo));
                }
                Ok(_) => warn!("Persisted chatbot configuration is invalid; ignoring"),
                Err(e) => warn!(error = %e, "Failed to decode persisted chatbot configuration"),
            },
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Could not read persisted chatbot configuration"),
        }

        let config = match seed_path {
            Some(path) => {
                let config = read_seed(path)?;
                info!(path = %path.display(), "Seeded chatbot configuration from file");
                config
            }
            None => ChatbotConfig::default(),
        };
        Ok(Self::new(config, repo))
    }

    /// Snapshot of the configuration in effect.
    pub async fn current(&self) -> Arc<ChatbotConfig> {
        self.current.read().await.clone()
    }

    /// Validate and install `config`, then persist it.
    ///
    /// A failed write is logged; the new value stays in effect for this
    /// process either way.
    pub async fn replace(&self, config: ChatbotConfig) -> Result<(), ConfigError> {
        config.validate().map_err(|message| ConfigError::InvalidValue {
            key: "chatbot_config".to_string(),
            message,
        })?;

        match serde_json::to_value(&config) {
            Ok(value) => {
                if let Err(e) = self.repo.set_setting(CHATBOT_CONFIG_KEY, &value).await {
                    warn!(error = %e, "Failed to persist chatbot configuration");
                }
            }
            Err(e) => warn!(error = %e, "Failed to encode chatbot configuration"),
        }

        *self.current.write().await = Arc::new(config);
        info!("Chatbot configuration replaced");
        Ok(())
    }
}

fn read_seed(path: &Path) -> Result<ChatbotConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    let config: ChatbotConfig =
        serde_json::from_str(&raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    config
        .validate()
        .map_err(|message| ConfigError::InvalidValue {
            key: path.display().to_string(),
            message,
        })?;
    Ok(config)
}
