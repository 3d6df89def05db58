//! HTTP endpoints for the survey bot.

use std::path::Path;
use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::{Query, State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::config_store::ConfigStore;
use super::model::ChatbotConfig;
use super::page::render_chat_page;
use super::policy::{ConversationPolicy, TurnOutcome};
use super::prompts::EMPTY_PROMPT_REPLY;
use super::state::Turn;

/// Longest session id accepted.
const MAX_SESSION_ID_LEN: usize = 128;

/// Longest prompt accepted, in characters.
const MAX_PROMPT_CHARS: usize = 4000;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub policy: Arc<ConversationPolicy>,
    pub config: Arc<ConfigStore>,
    /// A real provider was created at startup.
    pub llm_ready: bool,
    /// The configured database opened (not the in-memory fallback).
    pub storage_ready: bool,
}

/// Body of `POST /generate_chat` and the `POST /` form.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub session_id: Option<String>,
}

/// Request failures that surface as non-200 responses.
#[derive(Debug)]
pub enum ChatError {
    BadRequest(String),
    Internal,
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            Self::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error processing request.".to_string(),
            ),
        };
        (status, Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}

/// Build the survey routes.
pub fn survey_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(chat_page).post(chat_form))
        .route("/generate_chat", post(generate_chat))
        .route("/config", get(get_config).post(set_config))
        .route("/health", get(health))
        .with_state(state)
}

/// Survey routes plus static files, CORS and request tracing.
pub fn build_router(state: AppState, cors_origins: &[String], static_dir: &Path) -> Router {
    survey_routes(state)
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }
    let values: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(values))
}

// ── Chat ────────────────────────────────────────────────────────────────

fn validate_session_id(raw: &str) -> Result<&str, ChatError> {
    let session_id = raw.trim();
    if session_id.is_empty() {
        return Err(ChatError::BadRequest("session_id is required.".to_string()));
    }
    if session_id.len() > MAX_SESSION_ID_LEN {
        return Err(ChatError::BadRequest("session_id is too long.".to_string()));
    }
    Ok(session_id)
}

/// Trimmed prompt, or a 400 when it is over [`MAX_PROMPT_CHARS`].
fn validate_prompt(raw: &str) -> Result<&str, ChatError> {
    let prompt = raw.trim();
    if prompt.chars().count() > MAX_PROMPT_CHARS {
        return Err(ChatError::BadRequest("prompt is too long.".to_string()));
    }
    Ok(prompt)
}

/// Run one turn off the request path. A panic inside the turn becomes a 500.
async fn run_turn(
    state: &AppState,
    session_id: &str,
    prompt: &str,
) -> Result<TurnOutcome, ChatError> {
    let config = state.config.current().await;
    let policy = Arc::clone(&state.policy);
    let sid = session_id.to_string();
    let prompt = prompt.to_string();

    tokio::spawn(async move { policy.run_turn(&sid, &prompt, config).await })
        .await
        .map_err(|e| {
            error!(session_id, error = %e, "Turn task failed");
            ChatError::Internal
        })
}

/// POST /generate_chat
async fn generate_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ChatError> {
    let Json(req) = payload.map_err(|e| {
        warn!(error = %e, "Rejected chat request body");
        ChatError::BadRequest("Invalid request body.".to_string())
    })?;
    let session_id = validate_session_id(&req.session_id)?;

    let prompt = validate_prompt(&req.prompt)?;
    if prompt.is_empty() {
        return Ok(Json(ChatResponse {
            response: EMPTY_PROMPT_REPLY.to_string(),
        }));
    }

    let outcome = run_turn(&state, session_id, prompt).await?;
    Ok(Json(ChatResponse {
        response: outcome.response,
    }))
}

/// POST / (form variant). Renders the page with the updated transcript.
async fn chat_form(
    State(state): State<AppState>,
    Form(req): Form<ChatRequest>,
) -> Result<Html<String>, ChatError> {
    let session_id = validate_session_id(&req.session_id)?;
    let prompt = validate_prompt(&req.prompt)?;

    if prompt.is_empty() {
        let notice = Some(EMPTY_PROMPT_REPLY);
        return render_page(&state, session_id, Unsaved::default(), notice).await;
    }

    let outcome = run_turn(&state, session_id, prompt).await?;
    // The stored transcript lacks this exchange when the write failed, so
    // show it from the outcome instead.
    let unsaved = if outcome.saved {
        Unsaved::default()
    } else {
        Unsaved {
            turns: vec![Turn::user(prompt), Turn::model(outcome.response)],
            concluded: outcome.concluded,
        }
    };
    render_page(&state, session_id, unsaved, None).await
}

/// GET /?session_id=… starts or resumes a session.
async fn chat_page(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Html<String>, ChatError> {
    let session_id = match query.session_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => validate_session_id(id)?.to_string(),
        _ => {
            let id = Uuid::new_v4().to_string();
            info!(session_id = %id, "Starting new session");
            id
        }
    };
    render_page(&state, &session_id, Unsaved::default(), None).await
}

/// The last exchange when it could not be written to the store.
#[derive(Debug, Default)]
struct Unsaved {
    turns: Vec<Turn>,
    concluded: bool,
}

async fn render_page(
    state: &AppState,
    session_id: &str,
    unsaved: Unsaved,
    notice: Option<&str>,
) -> Result<Html<String>, ChatError> {
    let session = state.policy.store().load(session_id).await;
    let config = state.config.current().await;
    let mut history = session.history;
    history.extend(unsaved.turns);
    let concluded = session.concluded || unsaved.concluded;
    render_chat_page(session_id, &history, &config, notice, concluded)
        .map(Html)
        .map_err(|e| {
            error!(session_id, error = %e, "Failed to render chat page");
            ChatError::Internal
        })
}

// ── Config ──────────────────────────────────────────────────────────────

/// POST /config replaces the chatbot configuration.
async fn set_config(
    State(state): State<AppState>,
    payload: Result<Json<ChatbotConfig>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ChatError> {
    let Json(config) = payload.map_err(|e| ChatError::BadRequest(e.body_text()))?;
    state
        .config
        .replace(config)
        .await
        .map_err(|e| ChatError::BadRequest(e.to_string()))?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}

/// GET /config
async fn get_config(State(state): State<AppState>) -> Json<ChatbotConfig> {
    Json(state.config.current().await.as_ref().clone())
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let llm = state.llm_ready;
    let storage = state.storage_ready && state.policy.store().is_available().await;
    let healthy = llm && storage;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(serde_json::json!({
            "status": if healthy { "ok" } else { "degraded" },
            "llm": llm,
            "storage": storage,
            "model": state.policy.llm().model_name(),
            "mode": state.policy.mode(),
        })),
    )
}
