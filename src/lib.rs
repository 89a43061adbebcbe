//! ChatRelay - streaming chat gateway library
//!
//! This library provides the core functionality of the ChatRelay gateway:
//! relaying chat messages to a hosted LLM API, streaming the reply back to
//! clients token by token, and persisting conversation transcripts.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `store`: SQLite-backed transcript persistence (sessions and messages)
//! - `registry`: async facade over the store shared by request handlers
//! - `upstream`: provider client, SSE decoder, and prompt augmentation
//! - `relay`: per-request streaming lifecycle between client and provider
//! - `server`: HTTP routes, shared state, and error mapping
//! - `telemetry`: Prometheus recorder and metric emission helpers
//! - `announce`: best-effort registration with an external service registry
//! - `config`: configuration management and validation
//! - `error`: error types and result aliases
//! - `cli`: command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use chatrelay::Config;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/chatrelay.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     // Server assembly would go here
//!     Ok(())
//! }
//! ```

pub mod announce;
pub mod cli;
pub mod config;
pub mod error;
pub mod registry;
pub mod relay;
pub mod server;
pub mod store;
pub mod telemetry;
pub mod upstream;

// Re-export commonly used types
pub use config::Config;
pub use error::{RelayError, Result};
pub use registry::SessionRegistry;
pub use relay::{Frame, RelayCoordinator, SendRequest};
pub use server::{app, AppState};
pub use store::TranscriptStore;
