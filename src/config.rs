//! Configuration management for chatrelay
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides,
//! plus resolution of the upstream API credential.

use crate::error::{RelayError, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "config/chatrelay.yaml";

/// Environment variables checked for the API credential, in order.
const KEY_ENV_VARS: [&str; 2] = ["ANTHROPIC_API_KEY", "CLAUDE_API_KEY"];

/// Home-relative fallback files for the API credential, in order.
const KEY_FILE_PATHS: [&str; 3] = [
    ".anthropic/api_key",
    ".config/claude/api_key",
    ".claude/api_key",
];

/// Main configuration structure for chatrelay
///
/// Holds everything the service needs: HTTP listener settings, transcript
/// storage, the upstream provider, and system-prompt augmentation.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP server and deployment settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Transcript storage settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Upstream provider settings
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// System-prompt augmentation settings
    #[serde(default)]
    pub augment: AugmentConfig,
}

/// HTTP server and deployment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listening port for the HTTP API
    #[serde(default = "default_port")]
    pub port: u16,

    /// Advertised metrics port (exposition is served on the API port)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// External service registry endpoint; announcement is skipped when unset
    #[serde(default)]
    pub registry_url: Option<String>,

    /// PID file path; no PID file is written when unset
    #[serde(default)]
    pub pidfile: Option<PathBuf>,
}

fn default_port() -> u16 {
    8080
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            metrics_port: default_metrics_port(),
            registry_url: None,
            pidfile: None,
        }
    }
}

/// Transcript storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the SQLite database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl StorageConfig {
    /// Path of the transcript database inside the data directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("chat.db")
    }
}

/// Upstream provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Model requested from the Messages API
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum tokens the provider may generate per reply
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Bound on establishing the upstream response (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Number of recent transcript messages sent as context
    #[serde(default = "default_context_turns")]
    pub context_turns: usize,

    /// Optional API base URL override (useful for tests and local mocks)
    #[serde(default)]
    pub api_base: Option<String>,

    /// Base system prompt, before augmentation
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    8192
}

fn default_temperature() -> f64 {
    1.0
}

fn default_request_timeout() -> u64 {
    60
}

fn default_context_turns() -> usize {
    10
}

fn default_system_prompt() -> String {
    "You are Claude, a helpful AI assistant.".to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            request_timeout_seconds: default_request_timeout(),
            context_turns: default_context_turns(),
            api_base: None,
            system_prompt: default_system_prompt(),
        }
    }
}

/// System-prompt augmentation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AugmentConfig {
    /// Augmenter selection: "none" or "dataset"
    #[serde(default = "default_augment_mode")]
    pub mode: String,

    /// Directory holding static input files (dataset mode)
    #[serde(default = "default_input_dir")]
    pub input_dir: String,

    /// Dataset file name inside the input directory (dataset mode)
    #[serde(default)]
    pub dataset_file: Option<String>,
}

fn default_augment_mode() -> String {
    "none".to_string()
}

fn default_input_dir() -> String {
    "./input".to_string()
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            mode: default_augment_mode(),
            input_dir: default_input_dir(),
            dataset_file: None,
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed.
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RelayError::Config(format!("Failed to read config file: {e}")))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| RelayError::Config(format!("Failed to parse config: {e}")).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(port) = std::env::var("API_PORT") {
            if let Ok(value) = port.parse() {
                self.server.port = value;
            } else {
                tracing::warn!("Invalid API_PORT: {}", port);
            }
        }

        if let Ok(port) = std::env::var("METRICS_PORT") {
            if let Ok(value) = port.parse() {
                self.server.metrics_port = value;
            } else {
                tracing::warn!("Invalid METRICS_PORT: {}", port);
            }
        }

        if let Ok(url) = std::env::var("C2_REGISTRY_URL") {
            self.server.registry_url = Some(url);
        }

        if let Ok(path) = std::env::var("PIDFILE") {
            self.server.pidfile = Some(PathBuf::from(path));
        }

        if let Ok(dir) = std::env::var("DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }

        if let Ok(mode) = std::env::var("AUGMENT_MODE") {
            self.augment.mode = mode;
        }

        if let Ok(dir) = std::env::var("INPUT_DIR") {
            self.augment.input_dir = dir;
        }

        if let Ok(file) = std::env::var("DATASET_FILE") {
            self.augment.dataset_file = Some(file);
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(metrics_port) = cli.metrics_port {
            self.server.metrics_port = metrics_port;
        }
        if let Some(ref registry_url) = cli.registry_url {
            self.server.registry_url = Some(registry_url.clone());
        }
        if let Some(ref pidfile) = cli.pidfile {
            self.server.pidfile = Some(pidfile.clone());
        }
        if let Some(ref data_dir) = cli.data_dir {
            self.storage.data_dir = data_dir.clone();
        }
        if let Some(ref mode) = cli.augment_mode {
            self.augment.mode = mode.clone();
        }
        if let Some(ref input_dir) = cli.input_dir {
            self.augment.input_dir = input_dir.clone();
        }
        if let Some(ref dataset_file) = cli.dataset_file {
            self.augment.dataset_file = Some(dataset_file.clone());
        }
    }

    /// Validate the configuration
    ///
    /// Ensures all configuration values are within acceptable ranges
    /// and that required fields are properly set.
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(RelayError::Config("server.port must be greater than 0".to_string()).into());
        }

        if self.upstream.max_tokens == 0 {
            return Err(RelayError::Config(
                "upstream.max_tokens must be greater than 0".to_string(),
            )
            .into());
        }

        if !(0.0..=1.0).contains(&self.upstream.temperature) {
            return Err(RelayError::Config(
                "upstream.temperature must be between 0.0 and 1.0".to_string(),
            )
            .into());
        }

        if self.upstream.request_timeout_seconds == 0 {
            return Err(RelayError::Config(
                "upstream.request_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.upstream.context_turns == 0 {
            return Err(RelayError::Config(
                "upstream.context_turns must be greater than 0".to_string(),
            )
            .into());
        }

        if let Some(ref api_base) = self.upstream.api_base {
            Url::parse(api_base).map_err(|e| {
                RelayError::Config(format!("Invalid upstream.api_base '{api_base}': {e}"))
            })?;
        }

        if let Some(ref registry_url) = self.server.registry_url {
            Url::parse(registry_url).map_err(|e| {
                RelayError::Config(format!("Invalid server.registry_url '{registry_url}': {e}"))
            })?;
        }

        let valid_modes = ["none", "dataset"];
        if !valid_modes.contains(&self.augment.mode.as_str()) {
            return Err(RelayError::Config(format!(
                "Invalid augment mode: {}. Must be one of: {}",
                self.augment.mode,
                valid_modes.join(", ")
            ))
            .into());
        }

        if self.augment.mode == "dataset" && self.augment.dataset_file.is_none() {
            return Err(RelayError::Config(
                "augment mode 'dataset' requires augment.dataset_file".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

/// Resolve the upstream API credential.
///
/// Checks `ANTHROPIC_API_KEY` then `CLAUDE_API_KEY`, then falls back to
/// well-known key files under the home directory. The first non-empty
/// candidate wins; values are trimmed.
///
/// # Errors
///
/// Returns a configuration error when no credential is found anywhere.
/// The service treats that as fatal at startup.
pub fn resolve_api_key() -> Result<String> {
    for var in KEY_ENV_VARS {
        if let Ok(value) = std::env::var(var) {
            let value = value.trim();
            if !value.is_empty() {
                tracing::debug!("Using API key from {}", var);
                return Ok(value.to_string());
            }
        }
    }

    if let Some(base_dirs) = BaseDirs::new() {
        for rel in KEY_FILE_PATHS {
            let path = base_dirs.home_dir().join(rel);
            if let Ok(contents) = std::fs::read_to_string(&path) {
                let key = contents.trim();
                if !key.is_empty() {
                    tracing::debug!("Using API key from {}", path.display());
                    return Ok(key.to_string());
                }
            }
        }
    }

    Err(RelayError::Config(
        "No Anthropic API key found; set ANTHROPIC_API_KEY or create ~/.anthropic/api_key"
            .to_string(),
    )
    .into())
}
