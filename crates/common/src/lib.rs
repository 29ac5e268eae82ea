//! Dossier Common Library
//!
//! Shared code for the Dossier services including:
//! - Document domain model and processing state machine
//! - Document store abstraction with PostgreSQL and in-process backends
//! - Error types and handling
//! - Configuration management
//! - Tracing setup and metrics

pub mod config;
pub mod db;
pub mod domain;
pub mod errors;
pub mod metrics;
pub mod telemetry;
pub mod text;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::DocumentStore;
pub use errors::{AppError, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
