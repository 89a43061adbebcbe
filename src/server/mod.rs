//! HTTP surface
//!
//! Route table and shared state for the gateway. Handlers live in
//! [`routes`]; every route answers JSON except `/chat` (the embedded page),
//! `/chat/send` (SSE), and `/metrics` (Prometheus exposition text).

mod error;
mod routes;

pub use error::ApiError;

use crate::config::Config;
use crate::registry::SessionRegistry;
use crate::relay::RelayCoordinator;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Shared state cloned into each handler; all fields are cheap handles.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: SessionRegistry,
    pub coordinator: Arc<RelayCoordinator>,
    pub metrics: PrometheusHandle,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        registry: SessionRegistry,
        coordinator: Arc<RelayCoordinator>,
        metrics: PrometheusHandle,
    ) -> Self {
        Self {
            config,
            registry,
            coordinator,
            metrics,
        }
    }
}

/// Build the gateway router. Browser clients hit this cross-origin, so CORS
/// is permissive.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]);

    Router::new()
        .route("/health", get(routes::health))
        .route("/status", get(routes::status))
        .route(
            "/config",
            get(routes::get_config).post(routes::update_config),
        )
        .route("/job", post(routes::submit_job))
        .route("/batch", post(routes::submit_batch))
        .route("/chat", get(routes::chat_page))
        .route("/chat/session/new", post(routes::create_session))
        .route("/chat/send", post(routes::send_message))
        .route("/chat/history", get(routes::chat_history))
        .route("/chat/sessions", get(routes::chat_sessions))
        .route("/metrics", get(routes::render_metrics))
        .layer(cors)
        .with_state(state)
}
