//! Error types for chatrelay
//!
//! This module defines all error types used throughout the service,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for chatrelay operations
///
/// This enum encompasses all possible errors that can occur while
/// loading configuration, persisting transcripts, talking to the
/// upstream provider, and serving the HTTP surface.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Configuration-related errors (bad values, missing credentials)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The request is missing a required field or carries an invalid value
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A supplied session identifier does not exist in the store
    #[error("Unknown session: {0}")]
    UnknownSession(String),

    /// Upstream provider errors (non-success status, transport faults)
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Transcript storage errors (database operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Database driver errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Result type alias for chatrelay operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
