use std::sync::Arc;

use anyhow::Context;
use survey_followup::config::ServiceConfig;
use survey_followup::llm::{LlmProvider, UnavailableProvider, create_provider};
use survey_followup::store::{LibSqlBackend, SessionRepository, SessionStore};
use survey_followup::survey::{AppState, ConfigStore, ConversationPolicy, build_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServiceConfig::from_env().context("invalid service configuration")?;

    eprintln!("📋 Survey follow-up v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.model);
    eprintln!("   Mode: {:?}", config.mode);
    eprintln!("   Chat API: http://0.0.0.0:{}/generate_chat", config.port);

    // ── LLM ─────────────────────────────────────────────────────────────
    let (llm, llm_ready): (Arc<dyn LlmProvider>, bool) = match config.llm_config() {
        Some(llm_config) => match create_provider(&llm_config) {
            Ok(provider) => (provider, true),
            Err(e) => {
                tracing::error!(alert = "llm_auth", error = %e, "Failed to create LLM provider");
                (
                    Arc::new(UnavailableProvider::new(&config.model, e.to_string())),
                    false,
                )
            }
        },
        None => {
            tracing::error!(alert = "llm_auth", "GEMINI_API_KEY not set; model calls will fail");
            (
                Arc::new(UnavailableProvider::new(&config.model, "GEMINI_API_KEY not set")),
                false,
            )
        }
    };

    // ── Database ─────────────────────────────────────────────────────────
    let (repo, storage_ready): (Arc<dyn SessionRepository>, bool) =
        match LibSqlBackend::new_local(&config.db_path).await {
            Ok(db) => {
                eprintln!("   Database: {}", config.db_path.display());
                (Arc::new(db), true)
            }
            Err(e) => {
                tracing::error!(
                    path = %config.db_path.display(),
                    error = %e,
                    "Failed to open database; sessions will not survive a restart"
                );
                (
                    Arc::new(
                        LibSqlBackend::new_memory()
                            .await
                            .context("failed to create in-memory database")?,
                    ),
                    false,
                )
            }
        };

    // ── Survey ──────────────────────────────────────────────────────────
    let config_store = ConfigStore::load(Arc::clone(&repo), config.chatbot_config_path.as_deref())
        .await
        .context("failed to load chatbot configuration")?;

    let policy = ConversationPolicy::new(SessionStore::new(Arc::clone(&repo)), llm, config.mode);

    let state = AppState {
        policy: Arc::new(policy),
        config: Arc::new(config_store),
        llm_ready,
        storage_ready,
    };
    let app = build_router(state, &config.cors_origins, &config.static_dir);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "Survey server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await
        .context("server error")?;

    Ok(())
}
