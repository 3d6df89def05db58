//! Error types for the survey follow-up service.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Session store errors. Every variant means the store is unavailable for
/// this operation; callers degrade instead of failing the request.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// The closed set of outcomes a model call can fail with.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmError {
    /// The provider declined to generate any candidate (safety filtering).
    #[error("Provider {provider} blocked the request: {reason}")]
    Blocked { provider: String, reason: String },

    /// Candidates came back without any text parts.
    #[error("Provider {provider} returned no response")]
    NoResponse { provider: String },

    /// Text came back but was empty after cleanup.
    #[error("Provider {provider} returned empty text")]
    EmptyText { provider: String },

    #[error("Authentication failed for provider {provider}: {reason}")]
    Auth { provider: String, reason: String },

    #[error("Provider {provider} request failed (status {status:?}): {reason}")]
    Api {
        provider: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("Unexpected response from {provider}: {reason}")]
    Unknown { provider: String, reason: String },
}

impl LlmError {
    /// Short label for log fields and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Blocked { .. } => "blocked",
            Self::NoResponse { .. } => "no_response",
            Self::EmptyText { .. } => "empty_text",
            Self::Auth { .. } => "auth_error",
            Self::Api { .. } => "api_error",
            Self::Unknown { .. } => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llm_error_kind_labels() {
        let blocked = LlmError::Blocked {
            provider: "gemini".into(),
            reason: "SAFETY".into(),
        };
        assert_eq!(blocked.kind(), "blocked");

        let auth = LlmError::Auth {
            provider: "gemini".into(),
            reason: "API key not valid".into(),
        };
        assert_eq!(auth.kind(), "auth_error");
        assert!(auth.to_string().contains("API key not valid"));
    }

    #[test]
    fn database_error_converts_into_top_level() {
        let err: Error = DatabaseError::Query("boom".into()).into();
        assert!(matches!(err, Error::Database(DatabaseError::Query(_))));
        assert!(err.to_string().contains("boom"));
    }
}
