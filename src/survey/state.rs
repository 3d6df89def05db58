//! Per-session conversation state, persisted as one document per session.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transcript entries kept per session. Older entries are dropped first.
pub const MAX_HISTORY_TURNS: usize = 100;

/// Where a session currently stands.
///
/// Derived from the stored fields rather than stored itself:
/// AwaitingAnswer → FollowingUp → Concluded. A turn-1 request that yields no
/// usable points drops back to AwaitingAnswer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationPhase {
    /// No usable answer to the initial question yet.
    AwaitingAnswer,
    /// Pain points known; follow-ups in progress.
    FollowingUp,
    /// Concluding message sent; the session is inactive.
    Concluded,
}

impl std::fmt::Display for ConversationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AwaitingAnswer => "awaiting_answer",
            Self::FollowingUp => "following_up",
            Self::Concluded => "concluded",
        };
        write!(f, "{s}")
    }
}

/// Author of a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Model,
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Model,
            text: text.into(),
        }
    }
}

/// Persisted session state.
///
/// Stored as one JSON document per session id. Missing fields fall back to
/// their defaults so older documents still load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    /// Requests handled so far (reset to 0 when turn 1 yields no points).
    pub turn_count: u32,
    /// Pain points extracted at turn 1, in the order the model listed them.
    pub initial_pain_points: Vec<String>,
    /// Points a follow-up was successfully asked about. Serialized sorted.
    pub addressed_pain_points: BTreeSet<String>,
    /// Set once the concluding message has been sent.
    pub concluded: bool,
    /// Full transcript.
    pub history: Vec<Turn>,
    /// Assigned by the store on save; never written by the policy.
    #[serde(skip)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn phase(&self) -> ConversationPhase {
        if self.concluded {
            ConversationPhase::Concluded
        } else if self.turn_count == 0 || self.initial_pain_points.is_empty() {
            ConversationPhase::AwaitingAnswer
        } else {
            ConversationPhase::FollowingUp
        }
    }

    /// Check the invariants a loaded document must satisfy.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(stray) = self
            .addressed_pain_points
            .iter()
            .find(|p| !self.initial_pain_points.contains(p))
        {
            return Err(format!("addressed point '{stray}' is not an initial point"));
        }
        Ok(())
    }

    /// Clear the point data for a fresh turn 1.
    pub fn reset_points(&mut self) {
        self.initial_pain_points.clear();
        self.addressed_pain_points.clear();
    }

    /// First initial point not yet addressed, in original order.
    pub fn next_unaddressed(&self) -> Option<&str> {
        self.initial_pain_points
            .iter()
            .find(|p| !self.addressed_pain_points.contains(*p))
            .map(String::as_str)
    }

    /// Record a successfully asked follow-up. Points outside the initial list
    /// are ignored so the subset invariant always holds.
    pub fn mark_addressed(&mut self, point: &str) -> bool {
        if self.initial_pain_points.iter().any(|p| p == point) {
            self.addressed_pain_points.insert(point.to_string())
        } else {
            false
        }
    }

    pub fn all_addressed(&self) -> bool {
        self.next_unaddressed().is_none()
    }

    /// Append one user message and its reply, keeping at most
    /// [`MAX_HISTORY_TURNS`] entries.
    pub fn push_exchange(&mut self, user: &str, reply: &str) {
        self.history.push(Turn::user(user));
        self.history.push(Turn::model(reply));
        if self.history.len() > MAX_HISTORY_TURNS {
            let excess = self.history.len() - MAX_HISTORY_TURNS;
            self.history.drain(..excess);
        }
    }
}
