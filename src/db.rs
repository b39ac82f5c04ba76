//! Database module for the context orchestrator
//!
//! Provides persistence for working memory documents and chat messages.

mod schema;

pub use schema::*;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Working Memory Operations ====================

    /// Raw stored document, if any
    ///
    /// Validation is left to the caller so a malformed row can be told apart
    /// from a missing one.
    pub fn get_working_memory(&self, thread_id: &str, resource_id: &str) -> DbResult<Option<String>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT document FROM working_memory WHERE thread_id = ?1 AND resource_id = ?2",
            params![thread_id, resource_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(DbError::from)
    }

    /// Overwrite the stored document
    pub fn set_working_memory(&self, thread_id: &str, resource_id: &str, document: &str) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO working_memory (thread_id, resource_id, document, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(thread_id, resource_id)
             DO UPDATE SET document = excluded.document, updated_at = excluded.updated_at",
            params![thread_id, resource_id, document, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    // ==================== Message Operations ====================

    /// Append a message to a thread
    pub fn add_message(
        &self,
        message_id: &str,
        thread_id: &str,
        resource_id: &str,
        role: MessageRole,
        parts: &[MessagePart],
    ) -> DbResult<StoredMessage> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();

        let sequence_id: i64 = conn.query_row(
            "SELECT COALESCE(MAX(sequence_id), 0) + 1 FROM messages
             WHERE thread_id = ?1 AND resource_id = ?2",
            params![thread_id, resource_id],
            |row| row.get(0),
        )?;

        let parts_str = serde_json::to_string(parts)?;

        conn.execute(
            "INSERT INTO messages (message_id, thread_id, resource_id, sequence_id, role, parts, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                message_id,
                thread_id,
                resource_id,
                sequence_id,
                role.to_string(),
                parts_str,
                now.to_rfc3339(),
            ],
        )?;

        Ok(StoredMessage {
            id: message_id.to_string(),
            thread_id: thread_id.to_string(),
            resource_id: resource_id.to_string(),
            sequence_id,
            role,
            parts: parts.to_vec(),
            created_at: now,
        })
    }

    /// The latest `limit` messages of a thread, oldest first
    pub fn get_messages(&self, thread_id: &str, resource_id: &str, limit: usize) -> DbResult<Vec<StoredMessage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT message_id, thread_id, resource_id, sequence_id, role, parts, created_at
             FROM (
                 SELECT * FROM messages
                 WHERE thread_id = ?1 AND resource_id = ?2
                 ORDER BY sequence_id DESC
                 LIMIT ?3
             )
             ORDER BY sequence_id ASC",
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![thread_id, resource_id, limit], parse_message_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Number of messages stored for a thread
    pub fn count_messages(&self, thread_id: &str, resource_id: &str) -> DbResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE thread_id = ?1 AND resource_id = ?2",
            params![thread_id, resource_id],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

/// Parse a message row from the database
fn parse_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredMessage> {
    let parts_str: String = row.get(5)?;
    let parts = serde_json::from_str(&parts_str).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Unreadable message parts, returning empty");
        Vec::new()
    });

    Ok(StoredMessage {
        id: row.get(0)?,
        thread_id: row.get(1)?,
        resource_id: row.get(2)?,
        sequence_id: row.get(3)?,
        role: MessageRole::parse(&row.get::<_, String>(4)?),
        parts,
        created_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
