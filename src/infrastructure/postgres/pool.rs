//! PostgreSQL connection pool with circuit breaker integration.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;

use crate::config::DatabaseConfig;
use crate::infrastructure::circuit_breaker::CircuitBreaker;

#[derive(Debug, Error)]
pub enum PostgresPoolError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Circuit breaker is open")]
    CircuitOpen,
}

/// PostgreSQL connection pool with circuit breaker integration.
#[derive(Clone)]
pub struct PostgresPool {
    pool: PgPool,
    circuit_breaker: Arc<CircuitBreaker>,
    database_url: String,
}

impl PostgresPool {
    /// Connect a new pool from configuration.
    pub async fn connect(
        config: &DatabaseConfig,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, PostgresPoolError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds as u64))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds as u64))
            .connect(&config.url)
            .await?;

        let database_url = config.url.clone();
        tracing::info!(
            pool_size = config.pool_size,
            url = %mask_database_url(&database_url),
            "PostgreSQL connection pool created"
        );

        Ok(Self {
            pool,
            circuit_breaker,
            database_url,
        })
    }

    /// Run a query with circuit breaker protection.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, PostgresPoolError>
    where
        F: FnOnce(PgPool) -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        if !self.circuit_breaker.allow_request() {
            return Err(PostgresPoolError::CircuitOpen);
        }

        self.circuit_breaker
            .record(operation(self.pool.clone()).await)
            .map_err(PostgresPoolError::Sqlx)
    }

    /// Database URL with the password masked, for logs.
    pub fn database_url_masked(&self) -> String {
        mask_database_url(&self.database_url)
    }

    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("PostgreSQL connection pool closed");
    }
}

/// Replace the password in a connection URL with `***`.
pub fn mask_database_url(url: &str) -> String {
    let userinfo_start = url.find("://").map(|i| i + 3).unwrap_or(0);
    if let Some(at_pos) = url[userinfo_start..].find('@').map(|i| i + userinfo_start) {
        if let Some(colon_pos) = url[userinfo_start..at_pos].find(':').map(|i| i + userinfo_start) {
            return format!("{}***{}", &url[..colon_pos + 1], &url[at_pos..]);
        }
    }
    url.to_string()
}
