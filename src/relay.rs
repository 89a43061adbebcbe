//! Relay coordinator
//!
//! Drives one chat turn end to end: persist the user message, assemble the
//! recent-context window, stream the upstream reply token by token, and
//! persist the assistant text once the stream settles. Frames flow to the
//! HTTP layer through a bounded channel so a slow client applies backpressure
//! to the upstream read instead of buffering the whole reply in memory.

use crate::error::{RelayError, Result};
use crate::registry::SessionRegistry;
use crate::store::{ROLE_ASSISTANT, ROLE_USER};
use crate::telemetry;
use crate::upstream::{shape_turns, StreamEvent, Turn, Upstream};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

/// Frames buffered between the producer task and the SSE writer.
const FRAME_BUFFER: usize = 64;

/// User attributed to requests that carry no user ID.
pub const DEFAULT_USER: &str = "anonymous";

/// Body of a `/chat/send` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendRequest {
    /// The user's message text
    #[serde(default)]
    pub message: String,
    /// Existing session to continue, or absent to start a new one
    #[serde(default)]
    pub session_id: Option<String>,
    /// Caller identity for history grouping
    #[serde(default)]
    pub user_id: Option<String>,
}

/// One frame of the client-facing stream.
///
/// Serializes to the wire envelope: `{"model": ...}` once at the start,
/// `{"token": ...}` per fragment, then exactly one of `{"done": true}` or
/// `{"error": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Frame {
    Model { model: String },
    Token { token: String },
    Done { done: bool },
    Error { error: String },
}

impl Frame {
    pub fn model(model: impl Into<String>) -> Self {
        Frame::Model {
            model: model.into(),
        }
    }

    pub fn token(token: impl Into<String>) -> Self {
        Frame::Token {
            token: token.into(),
        }
    }

    pub fn done() -> Self {
        Frame::Done { done: true }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Frame::Error {
            error: error.into(),
        }
    }
}

/// A live turn: the session it belongs to, the frame receiver, and the
/// producer task driving the upstream read. Dropping `frames` cancels the
/// turn; the producer notices on its next send and stops without persisting
/// an assistant row.
#[derive(Debug)]
pub struct RelayStream {
    pub session_id: String,
    pub frames: mpsc::Receiver<Frame>,
    pub producer: JoinHandle<()>,
}

/// Orchestrates chat turns against one upstream model.
pub struct RelayCoordinator {
    registry: SessionRegistry,
    upstream: Arc<dyn Upstream>,
    context_turns: usize,
}

impl RelayCoordinator {
    pub fn new(
        registry: SessionRegistry,
        upstream: Arc<dyn Upstream>,
        context_turns: usize,
    ) -> Self {
        Self {
            registry,
            upstream,
            context_turns,
        }
    }

    /// Start one chat turn.
    ///
    /// Validates the request, persists the user message, and spawns the
    /// producer task. Errors returned here (blank message, unknown session,
    /// storage failure) happen before any frame is emitted, so the HTTP
    /// layer can still answer with a plain error status.
    pub async fn run(&self, request: SendRequest) -> Result<RelayStream> {
        let message = request.message.trim().to_string();
        if message.is_empty() {
            return Err(RelayError::BadRequest("message must not be empty".to_string()).into());
        }

        let user_id = request
            .user_id
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_USER.to_string());

        let session_id = self
            .registry
            .resolve_or_create(request.session_id, &user_id)
            .await?;
        // Token and latency accounting belong to assistant rows; user rows
        // store NULLs. A turn counts as received only once it is on disk.
        self.registry
            .append_turn(&session_id, ROLE_USER, &message, None, None)
            .await?;
        telemetry::incoming_message(&user_id);

        let history = self.registry.history(&session_id, self.context_turns).await?;
        let turns = shape_turns(
            history
                .into_iter()
                .map(|m| Turn {
                    role: m.role,
                    content: m.content,
                })
                .collect(),
        );
        debug!(
            "Relaying message for session {session_id} with {} context turns",
            turns.len()
        );

        let (tx, rx) = mpsc::channel(FRAME_BUFFER);
        let producer = tokio::spawn(produce(
            self.registry.clone(),
            self.upstream.clone(),
            session_id.clone(),
            user_id,
            turns,
            tx,
        ));

        Ok(RelayStream {
            session_id,
            frames: rx,
            producer,
        })
    }
}

/// Producer half of one turn: reads upstream events, forwards frames, and
/// persists the assistant reply on completion.
async fn produce(
    registry: SessionRegistry,
    upstream: Arc<dyn Upstream>,
    session_id: String,
    user_id: String,
    turns: Vec<Turn>,
    tx: mpsc::Sender<Frame>,
) {
    let started = Instant::now();

    if tx.send(Frame::model(upstream.model_label())).await.is_err() {
        telemetry::relay_error("client_disconnect");
        return;
    }

    telemetry::llm_request("initiated");
    let mut events = upstream.stream_reply(turns).await;

    let mut reply = String::new();
    while let Some(event) = events.next().await {
        match event {
            StreamEvent::Token(text) => {
                reply.push_str(&text);
                telemetry::token_generated();
                if tx.send(Frame::token(text)).await.is_err() {
                    telemetry::relay_error("client_disconnect");
                    return;
                }
            }
            StreamEvent::Done => break,
            StreamEvent::Error(message) => {
                warn!("Upstream error for session {session_id}: {message}");
                telemetry::llm_request("error");
                telemetry::relay_error("llm_error");
                // Tokens already shown to the client stay in the transcript.
                if !reply.is_empty() {
                    if let Err(e) =
                        persist_reply(&registry, &session_id, &user_id, &reply, started).await
                    {
                        warn!("Failed to persist partial reply for session {session_id}: {e}");
                    }
                }
                let _ = tx.send(Frame::error(message)).await;
                return;
            }
        }
    }

    telemetry::llm_request("success");
    telemetry::response_time(started.elapsed().as_secs_f64());
    // A stream that ended without producing text leaves no assistant row.
    if !reply.is_empty() {
        if let Err(e) = persist_reply(&registry, &session_id, &user_id, &reply, started).await {
            warn!("Failed to persist reply for session {session_id}: {e}");
            telemetry::relay_error("storage_error");
            let _ = tx
                .send(Frame::error(format!("failed to persist reply: {e}")))
                .await;
            return;
        }
    }
    let _ = tx.send(Frame::done()).await;
}

async fn persist_reply(
    registry: &SessionRegistry,
    session_id: &str,
    user_id: &str,
    reply: &str,
    started: Instant,
) -> Result<()> {
    registry
        .append_turn(
            session_id,
            ROLE_ASSISTANT,
            reply,
            Some(estimate_tokens(reply)),
            Some(started.elapsed().as_secs_f64()),
        )
        .await?;
    telemetry::outgoing_message(user_id);
    Ok(())
}

/// Rough token accounting: whitespace-separated words.
fn estimate_tokens(text: &str) -> i64 {
    text.split_whitespace().count() as i64
}
