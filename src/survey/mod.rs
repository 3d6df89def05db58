//! Survey follow-up conversation.
//!
//! A respondent answers an open question about the product. On the first
//! turn the bot extracts the pain points in that answer, then asks one
//! follow-up per turn until every point is covered. State lives in the
//! session store keyed by session id; the chatbot configuration is shared
//! process-wide and replaced whole through `/config`.

pub mod config_store;
pub mod model;
pub mod page;
pub mod policy;
pub mod prompts;
pub mod routes;
pub mod state;

pub use config_store::ConfigStore;
pub use model::{ChatbotConfig, ConversationMode, PromptParams};
pub use policy::{ConversationPolicy, TurnOutcome};
pub use routes::{AppState, build_router, survey_routes};
pub use state::{ConversationPhase, SessionState, Turn, TurnRole};
