//! Database layer for Dossier
//!
//! Provides:
//! - The `DocumentStore` abstraction
//! - A PostgreSQL implementation on SeaORM (`Repository`)
//! - An in-process implementation (`MemoryDocumentStore`)
//! - Connection pool management

mod memory;
pub mod models;
mod repository;
pub mod schema;
mod store;

pub use memory::MemoryDocumentStore;
pub use repository::Repository;
pub use store::DocumentStore;

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    connection: DatabaseConnection,
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database...");

        let mut opts = ConnectOptions::new(&config.url);
        opts.max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .sqlx_logging(false);

        let connection = Database::connect(opts)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Failed to connect: {}", e),
            })?;

        info!("Database connection established");

        Ok(Self { connection })
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        self.connection
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Ping failed: {}", e),
            })?;

        Ok(())
    }
}

/// Build the store selected by `config.url`, creating indexes when asked to.
pub async fn connect_store(config: &DatabaseConfig) -> Result<Arc<dyn DocumentStore>> {
    let store: Arc<dyn DocumentStore> = if config.is_memory() {
        info!("Using in-process document store");
        Arc::new(MemoryDocumentStore::new())
    } else {
        let pool = DbPool::new(config).await?;
        Arc::new(Repository::new(pool, config.query_timeout()))
    };

    if config.ensure_schema {
        store.ensure_indexes().await?;
    }

    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_url_builds_memory_store() {
        let config = DatabaseConfig {
            url: "memory://".into(),
            ..Default::default()
        };
        let store = connect_store(&config).await.unwrap();
        assert_eq!(store.backend(), "memory");
        store.ping().await.unwrap();
    }
}
