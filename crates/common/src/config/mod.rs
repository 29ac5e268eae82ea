//! Configuration management for Dossier services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Database URL that selects the in-process document store.
pub const MEMORY_DATABASE_URL: &str = "memory://";

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Upload limits and background processing
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// PostgreSQL URL, or `memory://` for the in-process store
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Upper bound on any single storage call, in seconds
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    /// Create the table and indexes at startup
    #[serde(default = "default_enabled")]
    pub ensure_schema: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestionConfig {
    /// Largest accepted upload in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,

    /// Accepted file extensions, lowercase without the dot
    #[serde(default = "default_supported_formats")]
    pub supported_formats: Vec<String>,

    /// Number of background processing workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Jobs that may wait for a worker before uploads are deferred to the backlog
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Upload bytes that queued jobs may hold in memory at once
    #[serde(default = "default_max_inflight_bytes")]
    pub max_inflight_bytes: u64,

    /// Backlog worker polling interval in seconds
    #[serde(default = "default_backlog_poll_interval")]
    pub backlog_poll_interval_secs: u64,

    /// Pending documents read per backlog poll
    #[serde(default = "default_backlog_batch_size")]
    pub backlog_batch_size: i64,

    /// Pending documents younger than this are left to the uploading gateway
    #[serde(default = "default_backlog_grace_period")]
    pub backlog_grace_period_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error); RUST_LOG takes precedence
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name attached to logs
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_database_url() -> String { "postgres://localhost/dossier".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_query_timeout() -> u64 { 10 }
fn default_enabled() -> bool { true }
fn default_max_upload_bytes() -> u64 { 50 * 1024 * 1024 }
fn default_supported_formats() -> Vec<String> {
    ["pdf", "doc", "docx", "txt"].iter().map(|f| f.to_string()).collect()
}
fn default_workers() -> usize { 4 }
fn default_queue_capacity() -> usize { 256 }
fn default_max_inflight_bytes() -> u64 { 256 * 1024 * 1024 }
fn default_backlog_poll_interval() -> u64 { 30 }
fn default_backlog_batch_size() -> i64 { 50 }
fn default_backlog_grace_period() -> u64 { 60 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "dossier".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__INGESTION__WORKERS=8
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("ingestion.supported_formats")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific file, still honouring APP__ overrides
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }
}

impl DatabaseConfig {
    /// Whether the in-process store is selected
    pub fn is_memory(&self) -> bool {
        self.url.trim() == MEMORY_DATABASE_URL
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

impl IngestionConfig {
    pub fn backlog_poll_interval(&self) -> Duration {
        Duration::from_secs(self.backlog_poll_interval_secs)
    }

    pub fn backlog_grace_period(&self) -> Duration {
        Duration::from_secs(self.backlog_grace_period_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            query_timeout_secs: default_query_timeout(),
            ensure_schema: default_enabled(),
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
            supported_formats: default_supported_formats(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            max_inflight_bytes: default_max_inflight_bytes(),
            backlog_poll_interval_secs: default_backlog_poll_interval(),
            backlog_batch_size: default_backlog_batch_size(),
            backlog_grace_period_secs: default_backlog_grace_period(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            ingestion: IngestionConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}
