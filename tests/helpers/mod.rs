//! Shared fixtures for the HTTP integration tests

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{self, Request};
use axum::response::Response;
use chatrelay::config::Config;
use chatrelay::relay::RelayCoordinator;
use chatrelay::server::AppState;
use chatrelay::store::TranscriptStore;
use chatrelay::telemetry;
use chatrelay::upstream::{EventStream, StreamEvent, Turn, Upstream};
use chatrelay::SessionRegistry;
use http_body_util::BodyExt;
use std::sync::Arc;
use tempfile::TempDir;

/// Upstream double that replays a fixed event script for every request.
#[allow(dead_code)]
pub struct ScriptedUpstream {
    label: String,
    events: Vec<StreamEvent>,
}

impl ScriptedUpstream {
    #[allow(dead_code)]
    pub fn new(events: Vec<StreamEvent>) -> Self {
        Self {
            label: "scripted-model".to_string(),
            events,
        }
    }
}

#[async_trait]
impl Upstream for ScriptedUpstream {
    fn model_label(&self) -> &str {
        &self.label
    }

    async fn stream_reply(&self, _turns: Vec<Turn>) -> EventStream {
        Box::pin(futures::stream::iter(self.events.clone()))
    }
}

/// Default config pointed at a per-test data directory.
#[allow(dead_code)]
pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = dir.path().to_path_buf();
    config
}

/// Assemble application state over a fresh store and the given upstream.
#[allow(dead_code)]
pub fn build_state(config: Config, upstream: Arc<dyn Upstream>) -> AppState {
    let store = TranscriptStore::open(config.storage.db_path()).expect("open store");
    let registry = SessionRegistry::new(store);
    let coordinator = Arc::new(RelayCoordinator::new(
        registry.clone(),
        upstream,
        config.upstream.context_turns,
    ));
    let metrics = telemetry::prometheus_handle().expect("install recorder");
    AppState::new(Arc::new(config), registry, coordinator, metrics)
}

/// State backed by a scripted upstream; the common case.
#[allow(dead_code)]
pub fn scripted_state(events: Vec<StreamEvent>) -> (AppState, TempDir) {
    let dir = TempDir::new().expect("tempdir");
    let config = test_config(&dir);
    let state = build_state(config, Arc::new(ScriptedUpstream::new(events)));
    (state, dir)
}

#[allow(dead_code)]
pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("build request")
}

#[allow(dead_code)]
pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(http::Method::POST)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("build request")
}

#[allow(dead_code)]
pub fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method(http::Method::POST)
        .uri(uri)
        .body(Body::empty())
        .expect("build request")
}

#[allow(dead_code)]
pub async fn body_text(response: Response) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}

#[allow(dead_code)]
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

/// Parse the JSON payloads out of an SSE body, skipping comment lines.
#[allow(dead_code)]
pub fn sse_frames(body: &str) -> Vec<serde_json::Value> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .filter_map(|data| serde_json::from_str(data.trim()).ok())
        .collect()
}
