use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message author roles stored in the transcript.
pub const ROLE_USER: &str = "user";
/// See [`ROLE_USER`].
pub const ROLE_ASSISTANT: &str = "assistant";

/// A stored conversation session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier for the session
    pub session_id: String,
    /// Owner of the session
    pub user_id: String,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// When a message was last appended to the session
    pub last_active: DateTime<Utc>,
    /// Opaque metadata supplied at creation, never updated afterwards
    pub metadata: serde_json::Value,
}

/// A single transcript message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier for the message
    pub message_id: String,
    /// Session the message belongs to
    pub session_id: String,
    /// Author role, `user` or `assistant`
    pub role: String,
    /// Message text
    pub content: String,
    /// When the message was appended
    pub timestamp: DateTime<Utc>,
    /// Approximate token count (assistant turns only)
    pub tokens: Option<i64>,
    /// End-to-end generation latency in seconds (assistant turns only)
    pub response_time: Option<f64>,
}
