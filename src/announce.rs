//! Best-effort service registration
//!
//! When a registry URL is configured, the gateway announces itself at
//! startup so the control plane can discover it. Registration failures are
//! logged and otherwise ignored; the gateway serves chat traffic either way.

use crate::config::Config;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

const ANNOUNCE_TIMEOUT: Duration = Duration::from_secs(5);

/// Descriptor POSTed to `{registry_url}/registry/register`.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceDescriptor {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub address: String,
    pub port: u16,
    pub capabilities: Vec<String>,
    pub version: String,
}

impl ServiceDescriptor {
    /// Build this process's descriptor. The instance ID gets a random
    /// suffix so restarts and replicas stay distinguishable.
    pub fn new(port: u16) -> Self {
        let instance = Uuid::new_v4().to_string();
        Self {
            id: format!("chatrelay-{}", &instance[..8]),
            name: "chatrelay".to_string(),
            service_type: "chat".to_string(),
            address: std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string()),
            port,
            capabilities: vec![
                "chat".to_string(),
                "streaming".to_string(),
                "history".to_string(),
            ],
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Announce this instance to the configured service registry, if any.
pub async fn announce(config: &Config) {
    let Some(registry_url) = config.server.registry_url.as_deref() else {
        return;
    };

    let descriptor = ServiceDescriptor::new(config.server.port);
    let url = format!("{}/registry/register", registry_url.trim_end_matches('/'));

    let client = match reqwest::Client::builder().timeout(ANNOUNCE_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => {
            warn!("Failed to build registry client: {e}");
            return;
        }
    };

    match client.post(&url).json(&descriptor).send().await {
        Ok(response) if response.status().is_success() => {
            info!("Registered with service registry as {}", descriptor.id);
        }
        Ok(response) => {
            warn!(
                "Service registry at {url} answered {}",
                response.status()
            );
        }
        Err(e) => {
            warn!("Failed to reach service registry at {url}: {e}");
        }
    }
}
