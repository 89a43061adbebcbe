//! Telemetry events emitted by the relay
//!
//! Thin helpers over the `metrics` macros so call sites stay readable and
//! metric names live in one place. Exposition is rendered by the `/metrics`
//! route from the handle returned by [`prometheus_handle`].
//!
//! # Metrics
//!
//! - `chat_messages_total{direction, user}`: counter of messages through the gateway
//! - `chat_tokens_total{type}`: counter of streamed tokens
//! - `llm_requests_total{status}`: counter of upstream requests by outcome
//! - `chat_errors_total{type}`: counter of relay failures by kind
//! - `chat_response_time_seconds`: histogram of end-to-end generation latency
//! - `chat_sessions_created_total`: counter of sessions created
//! - `chat_sessions_active`: gauge of sessions active in the trailing hour

use crate::error::{RelayError, Result};
use metrics::{gauge, histogram, increment_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::{Mutex, OnceLock};

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static INSTALL: Mutex<()> = Mutex::new(());

/// Install the Prometheus recorder and return its render handle.
///
/// The recorder is process-global, so this installs at most once; later
/// calls (and concurrent callers) receive clones of the same handle.
pub fn prometheus_handle() -> Result<PrometheusHandle> {
    let _guard = INSTALL.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    if let Some(handle) = HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
        RelayError::Config(format!("Failed to install Prometheus recorder: {e}"))
    })?;
    let _ = HANDLE.set(handle.clone());
    Ok(handle)
}

/// Record a message arriving from a client.
pub fn incoming_message(user_id: &str) {
    increment_counter!(
        "chat_messages_total",
        "direction" => "incoming",
        "user" => user_id.to_string()
    );
}

/// Record an assistant reply persisted for a client.
pub fn outgoing_message(user_id: &str) {
    increment_counter!(
        "chat_messages_total",
        "direction" => "outgoing",
        "user" => user_id.to_string()
    );
}

/// Record one streamed token forwarded to a client.
pub fn token_generated() {
    increment_counter!("chat_tokens_total", "type" => "output");
}

/// Record an upstream request outcome: initiated, success, or error.
pub fn llm_request(status: &'static str) {
    increment_counter!("llm_requests_total", "status" => status);
}

/// Record a relay failure by kind (llm_error, storage_error, client_disconnect).
pub fn relay_error(kind: &'static str) {
    increment_counter!("chat_errors_total", "type" => kind);
}

/// Record end-to-end generation latency.
pub fn response_time(seconds: f64) {
    histogram!("chat_response_time_seconds", seconds);
}

/// Record a session creation.
pub fn session_created() {
    increment_counter!("chat_sessions_created_total");
}

/// Set the active-session gauge from the freshness-window count.
pub fn active_sessions(count: u64) {
    gauge!("chat_sessions_active", count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helpers_never_panic() {
        // Recorded if a recorder is installed, dropped otherwise.
        incoming_message("alice");
        outgoing_message("alice");
        token_generated();
        llm_request("initiated");
        relay_error("llm_error");
        response_time(0.25);
        session_created();
        active_sessions(3);
    }

    #[test]
    fn test_prometheus_handle_installs_once() {
        let first = prometheus_handle().expect("install failed");
        let second = prometheus_handle().expect("second call failed");

        incoming_message("render-test");
        let exposition = first.render();
        assert!(exposition.contains("chat_messages_total"));

        // Both handles render the same recorder.
        assert!(second.render().contains("chat_messages_total"));
    }
}
