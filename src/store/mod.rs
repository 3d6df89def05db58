//! Persistence: libSQL-backed session documents and settings.

pub mod libsql_backend;
pub mod migrations;
pub mod sessions;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use sessions::SessionStore;
pub use traits::{SessionRepository, StoredDocument};
