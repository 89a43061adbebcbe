//! Session registry
//!
//! Shared async facade over [`TranscriptStore`]. Handlers clone the registry
//! into request tasks; every store call is blocking SQLite I/O and runs on
//! the blocking pool so the async runtime never stalls on disk.

use crate::error::Result;
use crate::store::{Message, Session, TranscriptStore};
use crate::telemetry;
use chrono::Duration;
use std::sync::Arc;
use tokio::task;

/// Cloneable handle to the transcript store.
#[derive(Clone)]
pub struct SessionRegistry {
    store: Arc<TranscriptStore>,
}

impl SessionRegistry {
    /// Wrap a transcript store in a shareable registry.
    pub fn new(store: TranscriptStore) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    /// Create a new session for `user_id` and record the creation metric.
    pub async fn create(&self, user_id: &str, metadata: serde_json::Value) -> Result<Session> {
        let store = self.store.clone();
        let user_id = user_id.to_string();
        let session =
            task::spawn_blocking(move || store.create_session(&user_id, metadata)).await??;
        telemetry::session_created();
        Ok(session)
    }

    /// Return the caller's session ID, creating a fresh session when none
    /// was supplied. Blank IDs count as absent; IDs that never existed are
    /// passed through and surface as unknown-session errors on first append.
    pub async fn resolve_or_create(
        &self,
        session_id: Option<String>,
        user_id: &str,
    ) -> Result<String> {
        match session_id {
            Some(id) if !id.trim().is_empty() => Ok(id),
            _ => {
                let session = self.create(user_id, serde_json::json!({})).await?;
                Ok(session.session_id)
            }
        }
    }

    /// Append one turn to a session's transcript.
    pub async fn append_turn(
        &self,
        session_id: &str,
        role: &str,
        content: &str,
        tokens: Option<i64>,
        response_time: Option<f64>,
    ) -> Result<String> {
        let store = self.store.clone();
        let session_id = session_id.to_string();
        let role = role.to_string();
        let content = content.to_string();
        task::spawn_blocking(move || {
            store.append_message(&session_id, &role, &content, tokens, response_time)
        })
        .await?
    }

    /// Fetch the most recent `limit` messages of a session, oldest first.
    pub async fn history(&self, session_id: &str, limit: usize) -> Result<Vec<Message>> {
        let store = self.store.clone();
        let session_id = session_id.to_string();
        task::spawn_blocking(move || store.recent_history(&session_id, limit)).await?
    }

    /// List a user's sessions, most recently active first.
    pub async fn sessions_for_user(&self, user_id: &str) -> Result<Vec<Session>> {
        let store = self.store.clone();
        let user_id = user_id.to_string();
        task::spawn_blocking(move || store.sessions_for_user(&user_id)).await?
    }

    /// Count sessions whose last activity falls inside `window`.
    pub async fn active_count(&self, window: Duration) -> Result<u64> {
        let store = self.store.clone();
        task::spawn_blocking(move || store.active_session_count(window)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ROLE_ASSISTANT, ROLE_USER};
    use tempfile::TempDir;

    fn test_registry() -> (SessionRegistry, TempDir) {
        let dir = TempDir::new().expect("tempdir");
        let store = TranscriptStore::open(dir.path().join("chat.db")).expect("open store");
        (SessionRegistry::new(store), dir)
    }

    #[tokio::test]
    async fn test_create_returns_session_for_user() {
        let (registry, _dir) = test_registry();

        let session = registry
            .create("alice", serde_json::json!({"source": "test"}))
            .await
            .expect("create");

        assert_eq!(session.user_id, "alice");
        assert!(!session.session_id.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_or_create_passes_existing_id_through() {
        let (registry, _dir) = test_registry();

        let resolved = registry
            .resolve_or_create(Some("sess-1".to_string()), "alice")
            .await
            .expect("resolve");

        assert_eq!(resolved, "sess-1");
    }

    #[tokio::test]
    async fn test_resolve_or_create_mints_session_when_absent_or_blank() {
        let (registry, _dir) = test_registry();

        let minted = registry
            .resolve_or_create(None, "alice")
            .await
            .expect("resolve none");
        let sessions = registry.sessions_for_user("alice").await.expect("list");
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_id, minted);

        let minted_again = registry
            .resolve_or_create(Some("   ".to_string()), "alice")
            .await
            .expect("resolve blank");
        assert_ne!(minted_again, minted);
    }

    #[tokio::test]
    async fn test_append_and_history_round_trip() {
        let (registry, _dir) = test_registry();
        let session = registry
            .create("bob", serde_json::json!({}))
            .await
            .expect("create");

        registry
            .append_turn(&session.session_id, ROLE_USER, "hello", None, None)
            .await
            .expect("append user");
        registry
            .append_turn(
                &session.session_id,
                ROLE_ASSISTANT,
                "hi there",
                Some(2),
                Some(0.4),
            )
            .await
            .expect("append assistant");

        let history = registry
            .history(&session.session_id, 10)
            .await
            .expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, ROLE_USER);
        assert_eq!(history[1].content, "hi there");
    }

    #[tokio::test]
    async fn test_append_to_unknown_session_fails() {
        let (registry, _dir) = test_registry();

        let result = registry
            .append_turn("no-such-session", ROLE_USER, "hello", None, None)
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_active_count_sees_fresh_sessions() {
        let (registry, _dir) = test_registry();
        registry
            .create("carol", serde_json::json!({}))
            .await
            .expect("create");

        let count = registry
            .active_count(Duration::hours(1))
            .await
            .expect("count");

        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_clones_share_the_store() {
        let (registry, _dir) = test_registry();
        let clone = registry.clone();

        let session = clone
            .create("dave", serde_json::json!({}))
            .await
            .expect("create via clone");

        let sessions = registry.sessions_for_user("dave").await.expect("list");
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_id, session.session_id);
    }
}
