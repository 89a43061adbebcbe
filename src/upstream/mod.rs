//! Upstream provider integration
//!
//! This module defines the trait the relay talks to, the wire-level turn
//! type, the SSE decoder, and the Anthropic Messages API client, plus the
//! system-prompt augmenters applied at startup.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

pub mod anthropic;
pub mod augment;
pub mod decoder;

pub use anthropic::AnthropicClient;
pub use augment::{create_augmenter, DatasetAugment, NoAugment, PromptAugmenter};
pub use decoder::{decode_data_line, LineBuffer, StreamEvent, DONE_SENTINEL};

/// One conversational turn in an upstream request payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Role of the turn author (user, assistant)
    pub role: String,
    /// Turn text
    pub content: String,
}

impl Turn {
    /// Creates a new user turn
    ///
    /// # Examples
    ///
    /// ```
    /// use chatrelay::upstream::Turn;
    ///
    /// let turn = Turn::user("Hello!");
    /// assert_eq!(turn.role, "user");
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Creates a new assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Stream of decoded upstream events.
///
/// Always ends with exactly one terminal event ([`StreamEvent::Done`] or
/// [`StreamEvent::Error`]). Dropping the stream cancels the upstream read.
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// A streaming completion provider
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Human-readable label for the configured model.
    fn model_label(&self) -> &str;

    /// Open a streaming completion for the given conversation.
    ///
    /// All failures (connection, timeout, non-success status) surface as
    /// in-stream [`StreamEvent::Error`] values; the call itself never fails.
    async fn stream_reply(&self, turns: Vec<Turn>) -> EventStream;
}

/// Shape a conversation window into a valid provider payload.
///
/// Turns with roles other than user/assistant are dropped, then leading
/// assistant turns are trimmed: the Messages API requires the conversation
/// to open with a user turn.
pub fn shape_turns(turns: Vec<Turn>) -> Vec<Turn> {
    let mut shaped: Vec<Turn> = turns
        .into_iter()
        .filter(|t| t.role == "user" || t.role == "assistant")
        .collect();

    let lead = shaped.iter().take_while(|t| t.role == "assistant").count();
    shaped.drain(..lead);
    shaped
}
