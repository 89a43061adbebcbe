//! Command-line interface definition for chatrelay
//!
//! This module defines the CLI structure using clap's derive API. The
//! service takes no subcommands; every flag overrides the corresponding
//! configuration value.

use clap::Parser;
use std::path::PathBuf;

/// chatrelay - streaming chat gateway for the Anthropic Messages API
///
/// Accepts chat messages over HTTP, persists conversation history, and
/// relays each message to the upstream provider, streaming the reply back
/// token by token.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "chatrelay")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "CHATRELAY_CONFIG")]
    pub config: Option<String>,

    /// Listening port for the HTTP API
    #[arg(long)]
    pub port: Option<u16>,

    /// Advertised metrics port
    #[arg(long)]
    pub metrics_port: Option<u16>,

    /// External service registry endpoint
    #[arg(long)]
    pub registry_url: Option<String>,

    /// Directory holding the transcript database
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// PID file path
    #[arg(long)]
    pub pidfile: Option<PathBuf>,

    /// System-prompt augmentation mode (none, dataset)
    #[arg(long)]
    pub augment_mode: Option<String>,

    /// Directory holding static input files
    #[arg(long)]
    pub input_dir: Option<String>,

    /// Dataset file name inside the input directory
    #[arg(long)]
    pub dataset_file: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
