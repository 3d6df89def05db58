//! Loads and saves `SessionState` documents.
//!
//! Loading never fails: an absent, corrupt or unreachable document yields a
//! fresh default state. Saving reports errors so the caller can log them.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::error::DatabaseError;
use crate::store::traits::SessionRepository;
use crate::survey::state::SessionState;

/// Keyed read/write access to per-session state.
#[derive(Clone)]
pub struct SessionStore {
    repo: Arc<dyn SessionRepository>,
}

impl SessionStore {
    pub fn new(repo: Arc<dyn SessionRepository>) -> Self {
        Self { repo }
    }

    /// Load a session, degrading to the default state on any problem.
    pub async fn load(&self, session_id: &str) -> SessionState {
        let stored = match self.repo.get_session_document(session_id).await {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                debug!(session_id, "No stored state; starting new session");
                return SessionState::default();
            }
            Err(e) => {
                error!(session_id, error = %e, "Session store unavailable; starting fresh");
                return SessionState::default();
            }
        };

        let mut state = match serde_json::from_str::<SessionState>(&stored.body) {
            Ok(state) => state,
            Err(e) => {
                warn!(session_id, error = %e, "Failed to decode stored state; starting fresh");
                return SessionState::default();
            }
        };

        if let Err(reason) = state.validate() {
            warn!(session_id, reason = %reason, "Stored state failed validation; starting fresh");
            return SessionState::default();
        }

        state.last_updated = stored.last_updated;
        state
    }

    /// Merge `state` into the stored document. On success the store's write
    /// timestamp is copied into `state.last_updated`.
    pub async fn save(
        &self,
        session_id: &str,
        state: &mut SessionState,
    ) -> Result<(), DatabaseError> {
        let document =
            serde_json::to_value(&*state).map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let stamp = self.repo.merge_session_document(session_id, &document).await?;
        state.last_updated = Some(stamp);
        debug!(session_id, turn = state.turn_count, "Session state saved");
        Ok(())
    }

    /// Whether the backing store answers.
    pub async fn is_available(&self) -> bool {
        self.repo.ping().await.is_ok()
    }
}
