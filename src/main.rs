//! ChatRelay - streaming chat gateway
//!
//! Main entry point: loads configuration, wires the store, upstream client,
//! and relay coordinator together, then serves the HTTP surface until
//! interrupted.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chatrelay::announce;
use chatrelay::cli::Cli;
use chatrelay::config::{self, Config, DEFAULT_CONFIG_PATH};
use chatrelay::relay::RelayCoordinator;
use chatrelay::server::{app, AppState};
use chatrelay::store::TranscriptStore;
use chatrelay::telemetry;
use chatrelay::upstream::{create_augmenter, AnthropicClient, Upstream};
use chatrelay::SessionRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // The credential never enters the config value; it lives in the client.
    let api_key = config::resolve_api_key()?;

    let metrics = telemetry::prometheus_handle()?;

    if let Some(pidfile) = &config.server.pidfile {
        write_pidfile(pidfile);
    }

    let store = TranscriptStore::open(config.storage.db_path())
        .with_context(|| format!("opening transcript store in {}", config.storage.data_dir.display()))?;
    let registry = SessionRegistry::new(store);

    let augmenter = create_augmenter(&config.augment)?;
    let system_prompt = augmenter.augment(&config.upstream.system_prompt);
    let upstream: Arc<dyn Upstream> =
        Arc::new(AnthropicClient::new(&config.upstream, api_key, system_prompt)?);
    let coordinator = Arc::new(RelayCoordinator::new(
        registry.clone(),
        upstream.clone(),
        config.upstream.context_turns,
    ));

    let config = Arc::new(config);
    let state = AppState::new(config.clone(), registry, coordinator, metrics);

    // Best-effort: the gateway serves chat traffic with or without a registry.
    announce::announce(&config).await;

    println!(
        "{} {} relay initialized (augment: {})",
        "✓".green(),
        config.upstream.model,
        config.augment.mode
    );
    println!(
        "{} Serving chat on port {} (metrics at /metrics)",
        "✓".green(),
        config.server.port
    );

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.server.port))
        .await
        .with_context(|| format!("binding 0.0.0.0:{}", config.server.port))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shut down cleanly");
    Ok(())
}

/// Initialize tracing subscriber with environment filter
fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "chatrelay=debug"
    } else {
        "chatrelay=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Write the process ID for init-system supervision. Failure warns; the
/// service runs fine without it.
fn write_pidfile(path: &Path) {
    if let Err(e) = std::fs::write(path, std::process::id().to_string()) {
        warn!("Failed to write PID file {}: {e}", path.display());
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
    }
    info!("Shutdown signal received");
}
