//! libSQL backend — async `SessionRepository` implementation.
//!
//! Session documents are JSON text in the `sessions` table. Saves are
//! merged with SQLite's `json_patch`, and `last_updated` comes from the
//! database clock so every writer shares one time source.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{SessionRepository, StoredDocument};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests and as a fallback).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(ndt.and_utc());
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(ndt.and_utc());
    }
    None
}

/// SQLite expression for the current UTC time in RFC 3339 with millis.
const NOW_RFC3339: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl SessionRepository for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT 1", ())
            .await
            .map_err(|e| DatabaseError::Query(format!("ping: {e}")))?;
        rows.next()
            .await
            .map_err(|e| DatabaseError::Query(format!("ping: {e}")))?;
        Ok(())
    }

    // ── Sessions ────────────────────────────────────────────────────

    async fn get_session_document(
        &self,
        session_id: &str,
    ) -> Result<Option<StoredDocument>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT document, last_updated FROM sessions WHERE id = ?1",
                params![session_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_session_document: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let body: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("get_session_document: {e}")))?;
                let last_updated = row
                    .get::<String>(1)
                    .ok()
                    .and_then(|s| parse_datetime(&s));
                Ok(Some(StoredDocument { body, last_updated }))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_session_document: {e}"))),
        }
    }

    async fn merge_session_document(
        &self,
        session_id: &str,
        document: &serde_json::Value,
    ) -> Result<DateTime<Utc>, DatabaseError> {
        if !document.is_object() {
            return Err(DatabaseError::Serialization(
                "session document must be a JSON object".to_string(),
            ));
        }
        let body = serde_json::to_string(document)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        // A corrupt stored document is replaced instead of patched.
        let sql = format!(
            "INSERT INTO sessions (id, document, last_updated) VALUES (?1, ?2, {NOW_RFC3339})
             ON CONFLICT (id) DO UPDATE SET
                document = CASE
                    WHEN json_valid(sessions.document) THEN json_patch(sessions.document, excluded.document)
                    ELSE excluded.document
                END,
                last_updated = excluded.last_updated
             RETURNING last_updated"
        );

        let mut rows = self
            .conn()
            .query(&sql, params![session_id, body])
            .await
            .map_err(|e| DatabaseError::Query(format!("merge_session_document: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("merge_session_document: {e}")))?
            .ok_or_else(|| {
                DatabaseError::Query("merge_session_document: no row returned".to_string())
            })?;
        let stamp: String = row
            .get(0)
            .map_err(|e| DatabaseError::Query(format!("merge_session_document: {e}")))?;

        parse_datetime(&stamp).ok_or_else(|| {
            DatabaseError::Serialization(format!("unparseable last_updated: {stamp}"))
        })
    }

    // ── Settings ────────────────────────────────────────────────────

    async fn get_setting(&self, key: &str) -> Result<Option<serde_json::Value>, DatabaseError> {
        let mut rows = self
            .conn()
            .query("SELECT value FROM settings WHERE key = ?1", params![key])
            .await
            .map_err(|e| DatabaseError::Query(format!("get_setting: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value_str: String = row.get(0).unwrap_or_else(|_| "null".to_string());
                let value: serde_json::Value =
                    serde_json::from_str(&value_str).unwrap_or(serde_json::Value::Null);
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_setting: {e}"))),
        }
    }

    async fn set_setting(
        &self,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let value_str = serde_json::to_string(value)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (key) DO UPDATE SET value = ?2, updated_at = ?3",
                params![key, value_str, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_setting: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    #[tokio::test]
    async fn missing_session_is_none() {
        let db = test_db().await;
        assert!(db.get_session_document("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn merge_creates_then_overlays() {
        let db = test_db().await;
        db.merge_session_document("s1", &json!({"turn_count": 1, "extra": "kept"}))
            .await
            .unwrap();
        db.merge_session_document("s1", &json!({"turn_count": 2}))
            .await
            .unwrap();

        let stored = db.get_session_document("s1").await.unwrap().unwrap();
        let doc: serde_json::Value = serde_json::from_str(&stored.body).unwrap();
        assert_eq!(doc["turn_count"], 2);
        assert_eq!(doc["extra"], "kept");
        assert!(stored.last_updated.is_some());
    }

    #[tokio::test]
    async fn merge_replaces_arrays_wholesale() {
        let db = test_db().await;
        db.merge_session_document("s1", &json!({"initial_pain_points": ["price", "docs"]}))
            .await
            .unwrap();
        db.merge_session_document("s1", &json!({"initial_pain_points": []}))
            .await
            .unwrap();

        let stored = db.get_session_document("s1").await.unwrap().unwrap();
        let doc: serde_json::Value = serde_json::from_str(&stored.body).unwrap();
        assert_eq!(doc["initial_pain_points"], json!([]));
    }

    #[tokio::test]
    async fn merge_stamps_monotonic_write_time() {
        let db = test_db().await;
        let first = db.merge_session_document("s1", &json!({"a": 1})).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = db.merge_session_document("s1", &json!({"a": 2})).await.unwrap();
        assert!(second >= first);

        let stored = db.get_session_document("s1").await.unwrap().unwrap();
        assert_eq!(stored.last_updated, Some(second));
    }

    #[tokio::test]
    async fn corrupt_document_is_replaced_on_merge() {
        let db = test_db().await;
        db.conn()
            .execute(
                "INSERT INTO sessions (id, document, last_updated) VALUES ('s1', 'not json', '2024-01-01T00:00:00Z')",
                (),
            )
            .await
            .unwrap();

        db.merge_session_document("s1", &json!({"turn_count": 1}))
            .await
            .unwrap();
        let stored = db.get_session_document("s1").await.unwrap().unwrap();
        let doc: serde_json::Value = serde_json::from_str(&stored.body).unwrap();
        assert_eq!(doc, json!({"turn_count": 1}));
    }

    #[tokio::test]
    async fn non_object_document_is_rejected() {
        let db = test_db().await;
        let err = db.merge_session_document("s1", &json!([1, 2])).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Serialization(_)));
    }

    #[tokio::test]
    async fn settings_round_trip() {
        let db = test_db().await;
        assert!(db.get_setting("chatbot_config").await.unwrap().is_none());

        db.set_setting("chatbot_config", &json!({"initialQuestion": "Hi?"}))
            .await
            .unwrap();
        db.set_setting("chatbot_config", &json!({"initialQuestion": "Hello?"}))
            .await
            .unwrap();

        let value = db.get_setting("chatbot_config").await.unwrap().unwrap();
        assert_eq!(value["initialQuestion"], "Hello?");
    }

    #[tokio::test]
    async fn file_backed_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sessions.db");
        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.merge_session_document("s1", &json!({"turn_count": 3}))
                .await
                .unwrap();
        }
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        let stored = db.get_session_document("s1").await.unwrap().unwrap();
        assert!(stored.body.contains("\"turn_count\":3"));
        db.ping().await.unwrap();
    }
}
