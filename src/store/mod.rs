//! Transcript persistence for chat sessions and messages
//!
//! Sessions and messages live in a single SQLite database. Connections are
//! opened per call (WAL journal plus a busy timeout make concurrent writers
//! safe), timestamps are RFC 3339 UTC text, and identifiers are UUID v4.

use crate::error::{RelayError, Result};
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;
use uuid::Uuid;

pub mod types;
pub use types::{Message, Session, ROLE_ASSISTANT, ROLE_USER};

/// Durable store for sessions and their messages
pub struct TranscriptStore {
    db_path: PathBuf,
}

impl TranscriptStore {
    /// Open (or create) the transcript database at the given path.
    ///
    /// Creates the parent directory and the schema when missing, so a fresh
    /// data directory works without any manual setup.
    ///
    /// # Examples
    ///
    /// ```
    /// use chatrelay::store::TranscriptStore;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let store = TranscriptStore::open(dir.path().join("chat.db")).unwrap();
    /// assert_eq!(store.active_session_count(chrono::Duration::hours(1)).unwrap(), 0);
    /// ```
    pub fn open<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        // Ensure parent directory exists so opening the DB file succeeds.
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create parent directory for database")
                .map_err(|e| RelayError::Storage(e.to_string()))?;
        }

        let store = Self { db_path };
        store.init()?;
        Ok(store)
    }

    /// Open a connection with the pragmas every caller relies on.
    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)
            .context("Failed to open database")
            .map_err(|e| RelayError::Storage(e.to_string()))?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA busy_timeout=5000;
             PRAGMA foreign_keys=ON;",
        )
        .context("Failed to apply database pragmas")
        .map_err(|e| RelayError::Storage(e.to_string()))?;

        Ok(conn)
    }

    /// Initialize the database schema
    fn init(&self) -> Result<()> {
        let conn = self.connect()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_active TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}'
            );
            CREATE TABLE IF NOT EXISTS messages (
                message_id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(session_id),
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                tokens INTEGER,
                response_time REAL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);",
        )
        .context("Failed to create tables")
        .map_err(|e| RelayError::Storage(e.to_string()))?;

        Ok(())
    }

    /// Create a new session for a user.
    ///
    /// The metadata object is stored verbatim and never merged or updated by
    /// later operations.
    pub fn create_session(&self, user_id: &str, metadata: serde_json::Value) -> Result<Session> {
        let conn = self.connect()?;

        let session = Session {
            session_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            created_at: Utc::now(),
            last_active: Utc::now(),
            metadata,
        };

        let metadata_json = serde_json::to_string(&session.metadata)
            .context("Failed to serialize session metadata")
            .map_err(|e| RelayError::Storage(e.to_string()))?;

        conn.execute(
            "INSERT INTO sessions (session_id, user_id, created_at, last_active, metadata)
            VALUES (?, ?, ?, ?, ?)",
            params![
                session.session_id,
                session.user_id,
                session.created_at.to_rfc3339(),
                session.last_active.to_rfc3339(),
                metadata_json
            ],
        )
        .context("Failed to insert session")
        .map_err(|e| RelayError::Storage(e.to_string()))?;

        Ok(session)
    }

    /// Append a message to a session.
    ///
    /// Inserts the message row and bumps the session's `last_active` in one
    /// transaction: either both happen or neither does.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::UnknownSession`] when the session does not
    /// exist; nothing is written in that case.
    pub fn append_message(
        &self,
        session_id: &str,
        role: &str,
        content: &str,
        tokens: Option<i64>,
        response_time: Option<f64>,
    ) -> Result<String> {
        let mut conn = self.connect()?;

        let tx = conn
            .transaction()
            .context("Failed to start transaction")
            .map_err(|e| RelayError::Storage(e.to_string()))?;

        let exists = tx
            .query_row(
                "SELECT 1 FROM sessions WHERE session_id = ?",
                params![session_id],
                |_| Ok(()),
            )
            .optional()
            .context("Failed to check session existence")
            .map_err(|e| RelayError::Storage(e.to_string()))?
            .is_some();

        if !exists {
            return Err(RelayError::UnknownSession(session_id.to_string()).into());
        }

        let message_id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        tx.execute(
            "INSERT INTO messages (message_id, session_id, role, content, timestamp, tokens, response_time)
            VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![message_id, session_id, role, content, now, tokens, response_time],
        )
        .context("Failed to insert message")
        .map_err(|e| RelayError::Storage(e.to_string()))?;

        tx.execute(
            "UPDATE sessions SET last_active = ? WHERE session_id = ?",
            params![now, session_id],
        )
        .context("Failed to update session activity")
        .map_err(|e| RelayError::Storage(e.to_string()))?;

        tx.commit()
            .context("Failed to commit transaction")
            .map_err(|e| RelayError::Storage(e.to_string()))?;

        Ok(message_id)
    }

    /// Load the `limit` most recent messages of a session, oldest first.
    ///
    /// Rows with equal timestamps keep their insertion order. An unknown
    /// session id yields an empty list rather than an error, so readers do
    /// not need to distinguish a missing session from an empty one.
    pub fn recent_history(&self, session_id: &str, limit: usize) -> Result<Vec<Message>> {
        let conn = self.connect()?;

        let mut stmt = conn
            .prepare(
                "SELECT message_id, session_id, role, content, timestamp, tokens, response_time
                FROM messages
                WHERE session_id = ?
                ORDER BY timestamp DESC, rowid DESC
                LIMIT ?",
            )
            .context("Failed to prepare statement")
            .map_err(|e| RelayError::Storage(e.to_string()))?;

        let rows = stmt
            .query_map(params![session_id, limit as i64], |row| {
                let timestamp_str: String = row.get(4)?;
                Ok(Message {
                    message_id: row.get(0)?,
                    session_id: row.get(1)?,
                    role: row.get(2)?,
                    content: row.get(3)?,
                    timestamp: parse_timestamp(&timestamp_str),
                    tokens: row.get(5)?,
                    response_time: row.get(6)?,
                })
            })
            .context("Failed to query messages")
            .map_err(|e| RelayError::Storage(e.to_string()))?;

        let mut messages = Vec::new();
        for message in rows.flatten() {
            messages.push(message);
        }

        // Newest-first query for the LIMIT, chronological order for callers.
        messages.reverse();
        Ok(messages)
    }

    /// List all sessions belonging to a user, most recently active first.
    pub fn sessions_for_user(&self, user_id: &str) -> Result<Vec<Session>> {
        let conn = self.connect()?;

        let mut stmt = conn
            .prepare(
                "SELECT session_id, user_id, created_at, last_active, metadata
                FROM sessions
                WHERE user_id = ?
                ORDER BY last_active DESC",
            )
            .context("Failed to prepare statement")
            .map_err(|e| RelayError::Storage(e.to_string()))?;

        let rows = stmt
            .query_map(params![user_id], |row| {
                let created_at_str: String = row.get(2)?;
                let last_active_str: String = row.get(3)?;
                let metadata_json: String = row.get(4)?;

                let metadata = serde_json::from_str(&metadata_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        4,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;

                Ok(Session {
                    session_id: row.get(0)?,
                    user_id: row.get(1)?,
                    created_at: parse_timestamp(&created_at_str),
                    last_active: parse_timestamp(&last_active_str),
                    metadata,
                })
            })
            .context("Failed to query sessions")
            .map_err(|e| RelayError::Storage(e.to_string()))?;

        let mut sessions = Vec::new();
        for session in rows {
            sessions.push(
                session
                    .context("Failed to read session row")
                    .map_err(|e| RelayError::Storage(e.to_string()))?,
            );
        }

        Ok(sessions)
    }

    /// Count sessions whose last activity falls within the trailing window.
    pub fn active_session_count(&self, window: Duration) -> Result<u64> {
        let conn = self.connect()?;

        let cutoff = (Utc::now() - window).to_rfc3339();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sessions WHERE last_active >= ?",
                params![cutoff],
                |row| row.get(0),
            )
            .context("Failed to count active sessions")
            .map_err(|e| RelayError::Storage(e.to_string()))?;

        Ok(count as u64)
    }
}

/// Parse an RFC 3339 timestamp, falling back to now on malformed rows.
fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread::sleep;
    use std::time::Duration as StdDuration;
    use tempfile::tempdir;

    /// Helper: create a temporary store backed by a temp directory.
    ///
    /// Returns both the `TranscriptStore` and the `TempDir` so the caller
    /// keeps ownership of the directory (preventing it from being removed).
    fn create_test_store() -> (TranscriptStore, tempfile::TempDir) {
        let dir = tempdir().expect("failed to create tempdir");
        let db_path = dir.path().join("chat.db");
        let store = TranscriptStore::open(db_path).expect("failed to create store");
        (store, dir)
    }

    #[test]
    fn test_open_creates_tables() {
        let (store, _dir) = create_test_store();
        let conn = Connection::open(&store.db_path).expect("open connection");
        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name IN ('sessions', 'messages')",
                [],
                |r| r.get(0),
            )
            .expect("query row");
        assert_eq!(count, 2);
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempdir().expect("failed to create tempdir");
        let db_path = dir.path().join("nested").join("chat.db");
        let _store = TranscriptStore::open(&db_path).expect("open failed");
        assert!(db_path.parent().unwrap().exists());
    }

    #[test]
    fn test_create_session_persists_row() {
        let (store, _dir) = create_test_store();
        let session = store
            .create_session("alice", json!({"plan": "pro"}))
            .expect("create failed");

        let sessions = store.sessions_for_user("alice").expect("list failed");
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_id, session.session_id);
        assert_eq!(sessions[0].user_id, "alice");
        assert_eq!(sessions[0].metadata, json!({"plan": "pro"}));
    }

    #[test]
    fn test_append_then_read_preserves_order_and_roles() {
        let (store, _dir) = create_test_store();
        let session = store
            .create_session("alice", json!({}))
            .expect("create failed");

        store
            .append_message(&session.session_id, ROLE_USER, "hello", None, None)
            .expect("append user failed");
        store
            .append_message(
                &session.session_id,
                ROLE_ASSISTANT,
                "hi there",
                Some(2),
                Some(0.5),
            )
            .expect("append assistant failed");

        let history = store
            .recent_history(&session.session_id, 10)
            .expect("history failed");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, ROLE_USER);
        assert_eq!(history[0].content, "hello");
        assert_eq!(history[1].role, ROLE_ASSISTANT);
        assert_eq!(history[1].content, "hi there");
        assert_eq!(history[1].tokens, Some(2));
        assert_eq!(history[1].response_time, Some(0.5));
    }

    #[test]
    fn test_append_to_unknown_session_writes_nothing() {
        let (store, _dir) = create_test_store();

        let err = store
            .append_message("no-such-session", ROLE_USER, "hello", None, None)
            .expect_err("append should fail");
        assert!(err.to_string().contains("Unknown session"));

        let conn = Connection::open(&store.db_path).expect("open connection");
        let count: i64 = conn
            .query_row("SELECT count(*) FROM messages", [], |r| r.get(0))
            .expect("query row");
        assert_eq!(count, 0);
    }

    #[test]
    fn test_append_bumps_last_active() {
        let (store, _dir) = create_test_store();
        let session = store
            .create_session("alice", json!({}))
            .expect("create failed");

        // Small delay to ensure timestamps differ
        sleep(StdDuration::from_millis(10));

        store
            .append_message(&session.session_id, ROLE_USER, "hello", None, None)
            .expect("append failed");

        let sessions = store.sessions_for_user("alice").expect("list failed");
        assert!(sessions[0].last_active > session.last_active);
        assert_eq!(sessions[0].created_at, session.created_at);
    }

    #[test]
    fn test_recent_history_honors_limit_oldest_first() {
        let (store, _dir) = create_test_store();
        let session = store
            .create_session("alice", json!({}))
            .expect("create failed");

        for i in 0..5 {
            store
                .append_message(
                    &session.session_id,
                    ROLE_USER,
                    &format!("message {i}"),
                    None,
                    None,
                )
                .expect("append failed");
            sleep(StdDuration::from_millis(5));
        }

        let history = store
            .recent_history(&session.session_id, 3)
            .expect("history failed");
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content, "message 2");
        assert_eq!(history[1].content, "message 3");
        assert_eq!(history[2].content, "message 4");
    }

    #[test]
    fn test_recent_history_unknown_session_is_empty() {
        let (store, _dir) = create_test_store();
        let history = store
            .recent_history("no-such-session", 10)
            .expect("history failed");
        assert!(history.is_empty());
    }

    #[test]
    fn test_recent_history_equal_timestamps_keep_insertion_order() {
        let (store, _dir) = create_test_store();
        let session = store
            .create_session("alice", json!({}))
            .expect("create failed");

        // Insert rows sharing one timestamp to exercise the rowid tie-break.
        let conn = Connection::open(&store.db_path).expect("open connection");
        let stamp = Utc::now().to_rfc3339();
        for (id, content) in [("m-1", "first"), ("m-2", "second"), ("m-3", "third")] {
            conn.execute(
                "INSERT INTO messages (message_id, session_id, role, content, timestamp)
                VALUES (?, ?, 'user', ?, ?)",
                params![id, session.session_id, content, stamp],
            )
            .expect("insert failed");
        }

        let history = store
            .recent_history(&session.session_id, 10)
            .expect("history failed");
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_sessions_for_user_most_recent_first() {
        let (store, _dir) = create_test_store();
        let first = store
            .create_session("alice", json!({}))
            .expect("create failed");
        sleep(StdDuration::from_millis(10));
        let second = store
            .create_session("alice", json!({}))
            .expect("create failed");
        store
            .create_session("bob", json!({}))
            .expect("create failed");

        let sessions = store.sessions_for_user("alice").expect("list failed");
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].session_id, second.session_id);
        assert_eq!(sessions[1].session_id, first.session_id);
    }

    #[test]
    fn test_sessions_for_user_empty_for_unknown_user() {
        let (store, _dir) = create_test_store();
        let sessions = store.sessions_for_user("nobody").expect("list failed");
        assert!(sessions.is_empty());
    }

    #[test]
    fn test_active_session_count_respects_window() {
        let (store, _dir) = create_test_store();
        let stale = store
            .create_session("alice", json!({}))
            .expect("create failed");
        store
            .create_session("bob", json!({}))
            .expect("create failed");

        assert_eq!(
            store
                .active_session_count(Duration::hours(1))
                .expect("count failed"),
            2
        );

        // Backdate one session past the window.
        let conn = Connection::open(&store.db_path).expect("open connection");
        let old = (Utc::now() - Duration::hours(2)).to_rfc3339();
        conn.execute(
            "UPDATE sessions SET last_active = ? WHERE session_id = ?",
            params![old, stale.session_id],
        )
        .expect("update failed");

        assert_eq!(
            store
                .active_session_count(Duration::hours(1))
                .expect("count failed"),
            1
        );
    }

    #[test]
    fn test_concurrent_appends_all_land() {
        let (store, dir) = create_test_store();
        let session = store
            .create_session("alice", json!({}))
            .expect("create failed");

        let db_path = dir.path().join("chat.db");
        let mut handles = Vec::new();
        for i in 0..4 {
            let path = db_path.clone();
            let session_id = session.session_id.clone();
            handles.push(std::thread::spawn(move || {
                let store = TranscriptStore::open(path).expect("open failed");
                for j in 0..5 {
                    store
                        .append_message(
                            &session_id,
                            ROLE_USER,
                            &format!("writer {i} message {j}"),
                            None,
                            None,
                        )
                        .expect("append failed");
                }
            }));
        }
        for handle in handles {
            handle.join().expect("writer panicked");
        }

        let history = store
            .recent_history(&session.session_id, 100)
            .expect("history failed");
        assert_eq!(history.len(), 20);
    }
}
