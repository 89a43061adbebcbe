//! HTTP handlers
//!
//! Pre-stream failures (missing fields, unknown sessions) answer with plain
//! JSON error statuses; once `/chat/send` starts streaming, failures arrive
//! as in-stream error frames on an HTTP 200.

use super::error::ApiError;
use super::AppState;
use crate::relay::{SendRequest, DEFAULT_USER};
use crate::telemetry;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse};
use axum::Json;
use chrono::Duration;
use serde::Deserialize;
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "chatrelay",
        "model": state.config.upstream.model,
    }))
}

pub async fn status(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let active = state.registry.active_count(Duration::hours(1)).await?;
    telemetry::active_sessions(active);

    Ok(Json(json!({
        "service": "chatrelay",
        "status": "running",
        "model": state.config.upstream.model,
        "active_sessions": active,
        "port": state.config.server.port,
        "metrics_port": state.config.server.metrics_port,
    })))
}

/// Echo the tunable parts of the config. The API credential is never part
/// of the config value, so it cannot leak here.
pub async fn get_config(State(state): State<AppState>) -> Json<serde_json::Value> {
    let config = &state.config;
    Json(json!({
        "model": config.upstream.model,
        "max_tokens": config.upstream.max_tokens,
        "temperature": config.upstream.temperature,
        "context_turns": config.upstream.context_turns,
        "augment_mode": config.augment.mode,
    }))
}

pub async fn update_config() -> ApiError {
    ApiError::not_implemented("config updates not supported")
}

pub async fn submit_job() -> ApiError {
    ApiError::not_implemented("job submission not supported")
}

pub async fn submit_batch() -> ApiError {
    ApiError::not_implemented("batch submission not supported")
}

pub async fn chat_page() -> Html<&'static str> {
    Html(include_str!("../../assets/chat.html"))
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

pub async fn create_session(
    State(state): State<AppState>,
    body: Option<Json<CreateSessionRequest>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let user_id = request
        .user_id
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_USER.to_string());
    let metadata = request.metadata.unwrap_or_else(|| json!({}));

    let session = state.registry.create(&user_id, metadata).await?;

    Ok(Json(json!({
        "session_id": session.session_id,
        "user_id": session.user_id,
        "created_at": session.created_at,
    })))
}

pub async fn send_message(
    State(state): State<AppState>,
    body: Option<Json<SendRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(request)) = body else {
        return Err(ApiError::bad_request("message is required"));
    };

    let stream = state.coordinator.run(request).await?;
    let frames = ReceiverStream::new(stream.frames).map(|frame| Event::default().json_data(frame));

    Ok(Sse::new(frames).keep_alive(KeepAlive::default()))
}

fn default_history_limit() -> usize {
    50
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default = "default_history_limit")]
    limit: usize,
}

pub async fn chat_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Some(session_id) = params.session_id.filter(|s| !s.trim().is_empty()) else {
        return Err(ApiError::bad_request("session_id is required"));
    };

    let history = state.registry.history(&session_id, params.limit).await?;

    Ok(Json(json!({
        "session_id": session_id,
        "history": history,
    })))
}

#[derive(Debug, Deserialize)]
pub struct SessionsParams {
    #[serde(default)]
    user_id: Option<String>,
}

pub async fn chat_sessions(
    State(state): State<AppState>,
    Query(params): Query<SessionsParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user_id = params
        .user_id
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_USER.to_string());

    let sessions = state.registry.sessions_for_user(&user_id).await?;

    Ok(Json(json!({
        "user_id": user_id,
        "sessions": sessions,
    })))
}

pub async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
