//! Database connection management using sqlx
//!
//! Connections are not pooled: every logical operation opens its own
//! connection and hands it back through [`ConnectionFactory::release`].

use crate::config::DatabaseConfig;
use crate::error::{AssistantError, Result};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ConnectionFactory {
    options: PgConnectOptions,
}

impl ConnectionFactory {
    pub fn new(options: PgConnectOptions) -> Self {
        Self { options }
    }

    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        Ok(Self::new(connect_options(config)?))
    }

    /// Open a fresh connection for one logical operation.
    pub async fn open(&self) -> Result<PgConnection> {
        let started = Instant::now();
        let conn = PgConnection::connect_with(&self.options)
            .await
            .map_err(|e| AssistantError::StorageUnavailable(e.to_string()))?;
        debug!("Opened database connection in {:?}", started.elapsed());
        Ok(conn)
    }

    /// Close a connection; failures to close are logged, not surfaced.
    pub async fn release(&self, conn: PgConnection) {
        if let Err(e) = conn.close().await {
            warn!("Failed to close database connection cleanly: {}", e);
        }
    }
}

pub fn connect_options(config: &DatabaseConfig) -> Result<PgConnectOptions> {
    if let Some(url) = &config.url {
        return url
            .parse::<PgConnectOptions>()
            .map_err(|e| AssistantError::Config(format!("Invalid DATABASE_URL: {}", e)));
    }

    Ok(PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .database(&config.database)
        .username(&config.user)
        .password(&config.password))
}
