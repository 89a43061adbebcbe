//! Anthropic Messages API client
//!
//! Opens streaming completions against `/v1/messages` and decodes the SSE
//! body into events. The decoded events flow through a bounded channel, so a
//! slow consumer exerts backpressure on the socket read, and dropping the
//! event stream stops the read entirely.

use crate::config::UpstreamConfig;
use crate::error::{RelayError, Result};
use crate::upstream::decoder::{decode_data_line, LineBuffer, StreamEvent};
use crate::upstream::{EventStream, Turn, Upstream};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Default endpoint of the Messages API.
pub const DEFAULT_API_BASE: &str = "https://api.anthropic.com";

/// API version header value required by the Messages API.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Longest error-body prefix included in a diagnostic.
const ERROR_BODY_PREFIX: usize = 200;

/// Events buffered between the socket read and the relay.
const EVENT_BUFFER: usize = 256;

/// Wire request for the Messages API
#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    system: &'a str,
    messages: &'a [Turn],
    stream: bool,
}

/// Streaming client for the Anthropic Messages API
pub struct AnthropicClient {
    client: reqwest::Client,
    messages_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
    system_prompt: String,
    request_timeout: Duration,
}

impl AnthropicClient {
    /// Build a client from upstream configuration.
    ///
    /// `api_base` overrides the production endpoint (tests point it at a
    /// mock server). The system prompt arrives already augmented.
    pub fn new(config: &UpstreamConfig, api_key: String, system_prompt: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| RelayError::Config(format!("Failed to build HTTP client: {e}")))?;

        let base = config
            .api_base
            .clone()
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let messages_url = format!("{}/v1/messages", base.trim_end_matches('/'));

        Ok(Self {
            client,
            messages_url,
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            system_prompt,
            request_timeout: Duration::from_secs(config.request_timeout_seconds),
        })
    }
}

#[async_trait]
impl Upstream for AnthropicClient {
    fn model_label(&self) -> &str {
        &self.model
    }

    async fn stream_reply(&self, turns: Vec<Turn>) -> EventStream {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        let request = self
            .client
            .post(&self.messages_url)
            .header("x-api-key", self.api_key.as_str())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&MessagesRequest {
                model: &self.model,
                max_tokens: self.max_tokens,
                temperature: self.temperature,
                system: &self.system_prompt,
                messages: &turns,
                stream: true,
            });
        let timeout = self.request_timeout;

        tokio::spawn(async move {
            let response = match tokio::time::timeout(timeout, request.send()).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    tracing::error!("Upstream request failed: {}", e);
                    let _ = tx
                        .send(StreamEvent::Error(format!("upstream request failed: {e}")))
                        .await;
                    return;
                }
                Err(_) => {
                    tracing::error!("Upstream request timed out after {}s", timeout.as_secs());
                    let _ = tx
                        .send(StreamEvent::Error(format!(
                            "upstream request timed out after {}s",
                            timeout.as_secs()
                        )))
                        .await;
                    return;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let prefix: String = body.chars().take(ERROR_BODY_PREFIX).collect();
                tracing::error!("Upstream returned {}: {}", status, prefix);
                let _ = tx
                    .send(StreamEvent::Error(format!(
                        "upstream status {}: {}",
                        status.as_u16(),
                        prefix
                    )))
                    .await;
                return;
            }

            pump_events(response, tx).await;
        });

        Box::pin(ReceiverStream::new(rx))
    }
}

/// Read the SSE body, forwarding decoded events until a terminal one.
///
/// A transport fault becomes a single `Error` event; a body that ends
/// without a sentinel still produces `Done`, so every stream terminates.
async fn pump_events(response: reqwest::Response, tx: mpsc::Sender<StreamEvent>) {
    let mut body = response.bytes_stream();
    let mut lines = LineBuffer::new();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!("Upstream stream interrupted: {}", e);
                let _ = tx
                    .send(StreamEvent::Error(format!(
                        "upstream stream interrupted: {e}"
                    )))
                    .await;
                return;
            }
        };

        for line in lines.push(&chunk) {
            if let Some(event) = decode_data_line(&line) {
                let terminal = event.is_terminal();
                if tx.send(event).await.is_err() {
                    // Receiver dropped: the relay is gone, stop reading.
                    return;
                }
                if terminal {
                    return;
                }
            }
        }
    }

    let _ = tx.send(StreamEvent::Done).await;
}
