//! ConversationPolicy — decides what the bot says next and how the session
//! state moves.
//!
//! One load and one save per turn. The model is called at most twice on
//! turn 1 (extraction, then the first follow-up) and at most once after.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::LlmError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::store::SessionStore;

use super::model::{ChatbotConfig, ConversationMode};
use super::prompts::{
    BLOCKED_REPLY, CLARIFY_REPLY, CONCLUSION_PHRASE, EXTRACTION_FAILED_REPLY,
    FOLLOW_UP_FAILED_REPLY, UNAVAILABLE_REPLY, extraction_prompt, follow_up_prompt,
    guided_system_instruction, history_for_model, is_conclusion, parse_pain_points,
};
use super::state::{SessionState, Turn, TurnRole};

/// Output budget for every model call; a question or a point list fits
/// well inside it.
const REPLY_MAX_TOKENS: u32 = 512;

/// What one turn produced.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Text shown to the respondent.
    pub response: String,
    /// The session is concluded after this turn.
    pub concluded: bool,
    /// Whether the state write succeeded.
    pub saved: bool,
}

/// Runs conversation turns against the session store and the model.
#[derive(Clone)]
pub struct ConversationPolicy {
    store: SessionStore,
    llm: Arc<dyn LlmProvider>,
    mode: ConversationMode,
}

impl ConversationPolicy {
    pub fn new(store: SessionStore, llm: Arc<dyn LlmProvider>, mode: ConversationMode) -> Self {
        Self { store, llm, mode }
    }

    pub fn mode(&self) -> ConversationMode {
        self.mode
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn llm(&self) -> &Arc<dyn LlmProvider> {
        &self.llm
    }

    /// Handle one user message for `session_id`.
    ///
    /// `prompt` must already be non-empty; the handler short-circuits empty
    /// input. A failed save is logged and the reply is still returned.
    pub async fn run_turn(
        &self,
        session_id: &str,
        prompt: &str,
        config: Arc<ChatbotConfig>,
    ) -> TurnOutcome {
        let mut state = self.store.load(session_id).await;

        let response = match self.mode {
            ConversationMode::PointTracking => {
                self.point_turn(session_id, &mut state, prompt, &config).await
            }
            ConversationMode::Guided => {
                self.guided_turn(session_id, &mut state, prompt, &config).await
            }
        };

        let saved = match self.store.save(session_id, &mut state).await {
            Ok(()) => true,
            Err(e) => {
                error!(session_id, error = %e, "Failed to save session state; replying anyway");
                false
            }
        };

        debug!(
            session_id,
            turn = state.turn_count,
            phase = %state.phase(),
            "Turn complete"
        );

        TurnOutcome {
            response,
            concluded: state.concluded,
            saved,
        }
    }

    // ── Point tracking ──────────────────────────────────────────────────

    async fn point_turn(
        &self,
        session_id: &str,
        state: &mut SessionState,
        prompt: &str,
        config: &ChatbotConfig,
    ) -> String {
        if state.concluded {
            return concluded_reply(session_id, state);
        }

        state.turn_count += 1;
        let reply = if state.turn_count == 1 || state.initial_pain_points.is_empty() {
            state.turn_count = 1;
            self.first_turn(session_id, state, prompt, config).await
        } else {
            self.ask_next(session_id, state, config).await
        };

        state.push_exchange(prompt, &reply);
        reply
    }

    async fn first_turn(
        &self,
        session_id: &str,
        state: &mut SessionState,
        prompt: &str,
        config: &ChatbotConfig,
    ) -> String {
        state.reset_points();

        let request =
            CompletionRequest::single(extraction_prompt(prompt)).with_max_tokens(REPLY_MAX_TOKENS);
        let raw = match self.complete(session_id, "extraction", request).await {
            Ok(text) => text,
            // Empty output counts as "no points", not as a failure.
            Err(LlmError::EmptyText { .. }) => String::new(),
            Err(e) => {
                state.turn_count = 0;
                return apology(&e, EXTRACTION_FAILED_REPLY);
            }
        };

        let points = parse_pain_points(&raw);
        if points.is_empty() {
            info!(session_id, "No pain points found; asking for clarification");
            state.turn_count = 0;
            return CLARIFY_REPLY.to_string();
        }

        info!(session_id, points = ?points, "Extracted pain points");
        state.initial_pain_points = points;
        self.ask_next(session_id, state, config).await
    }

    /// Ask about the first unaddressed point, or conclude.
    async fn ask_next(
        &self,
        session_id: &str,
        state: &mut SessionState,
        config: &ChatbotConfig,
    ) -> String {
        let Some(target) = state.next_unaddressed().map(str::to_string) else {
            return conclude(session_id, state, "all points addressed");
        };
        if config
            .prompt_params
            .follow_up_limit_reached(state.addressed_pain_points.len())
        {
            return conclude(session_id, state, "follow-up limit reached");
        }

        let request = CompletionRequest::single(follow_up_prompt(
            &state.initial_pain_points,
            &target,
            &config.prompt_params,
        ))
        .with_max_tokens(REPLY_MAX_TOKENS);
        match self.complete(session_id, "follow_up", request).await {
            Ok(question) if is_conclusion(&question) => {
                conclude(session_id, state, "model concluded")
            }
            Ok(question) => {
                state.mark_addressed(&target);
                debug!(session_id, target = %target, "Follow-up asked");
                question
            }
            Err(e) => apology(&e, FOLLOW_UP_FAILED_REPLY),
        }
    }

    // ── Guided ──────────────────────────────────────────────────────────

    async fn guided_turn(
        &self,
        session_id: &str,
        state: &mut SessionState,
        prompt: &str,
        config: &ChatbotConfig,
    ) -> String {
        if state.concluded {
            return concluded_reply(session_id, state);
        }

        state.turn_count += 1;

        let asked = state
            .history
            .iter()
            .skip_while(|t| t.role == TurnRole::Model)
            .filter(|t| t.role == TurnRole::Model)
            .count();
        if config.prompt_params.follow_up_limit_reached(asked) {
            let reply = conclude(session_id, state, "follow-up limit reached");
            state.push_exchange(prompt, &reply);
            return reply;
        }

        let mut context = state.history.clone();
        context.push(Turn::user(prompt));
        let mut messages = vec![ChatMessage::system(guided_system_instruction(config))];
        messages.extend(history_for_model(&context));

        match self
            .complete(
                session_id,
                "guided",
                CompletionRequest::new(messages).with_max_tokens(REPLY_MAX_TOKENS),
            )
            .await
        {
            Ok(text) => {
                let reply = if is_conclusion(&text) {
                    conclude(session_id, state, "model concluded")
                } else {
                    text
                };
                state.push_exchange(prompt, &reply);
                reply
            }
            Err(e) => apology(&e, FOLLOW_UP_FAILED_REPLY),
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    async fn complete(
        &self,
        session_id: &str,
        stage: &'static str,
        request: CompletionRequest,
    ) -> Result<String, LlmError> {
        match self.llm.complete(request).await {
            Ok(response) => {
                debug!(
                    session_id,
                    stage,
                    input_tokens = response.input_tokens,
                    output_tokens = response.output_tokens,
                    "Model call succeeded"
                );
                Ok(response.content)
            }
            Err(e) => {
                if matches!(e, LlmError::Auth { .. }) {
                    error!(
                        session_id,
                        stage,
                        alert = "llm_auth",
                        error = %e,
                        "Model rejected credentials"
                    );
                } else {
                    warn!(session_id, stage, kind = e.kind(), error = %e, "Model call failed");
                }
                Err(e)
            }
        }
    }
}

/// Reply for a session that has already ended. The transcript is left as it
/// was; only the request counter moves.
fn concluded_reply(session_id: &str, state: &mut SessionState) -> String {
    debug!(session_id, "Session already concluded");
    state.turn_count = state.turn_count.saturating_add(1);
    CONCLUSION_PHRASE.to_string()
}

fn conclude(session_id: &str, state: &mut SessionState, why: &str) -> String {
    info!(session_id, why, "Concluding conversation");
    state.concluded = true;
    CONCLUSION_PHRASE.to_string()
}

/// User-facing text for a failed model call.
fn apology(error: &LlmError, fallback: &str) -> String {
    match error {
        LlmError::Blocked { .. } => BLOCKED_REPLY,
        LlmError::Auth { .. } => UNAVAILABLE_REPLY,
        _ => fallback,
    }
    .to_string()
}
