//! Backend-agnostic persistence trait for session documents and settings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;

/// A session document as stored, before it is interpreted.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    /// Raw JSON text. May be corrupt; the caller decides what to do.
    pub body: String,
    /// Write timestamp assigned by the store on the last save.
    pub last_updated: Option<DateTime<Utc>>,
}

/// Document store keyed by session id.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    /// Cheap liveness check used by the health endpoint.
    async fn ping(&self) -> Result<(), DatabaseError>;

    // ── Sessions ────────────────────────────────────────────────────

    /// Fetch the document for a session, if one exists.
    async fn get_session_document(
        &self,
        session_id: &str,
    ) -> Result<Option<StoredDocument>, DatabaseError>;

    /// Merge `document` into the stored one (create if absent, overlay its
    /// top-level fields if present) and stamp the write time. Returns the
    /// timestamp the store assigned.
    async fn merge_session_document(
        &self,
        session_id: &str,
        document: &serde_json::Value,
    ) -> Result<DateTime<Utc>, DatabaseError>;

    // ── Settings ────────────────────────────────────────────────────

    /// Read a JSON setting by key.
    async fn get_setting(&self, key: &str) -> Result<Option<serde_json::Value>, DatabaseError>;

    /// Write a JSON setting, replacing any previous value.
    async fn set_setting(&self, key: &str, value: &serde_json::Value)
    -> Result<(), DatabaseError>;
}
