//! Redis connection pool for the document backend.
//!
//! Wraps a multiplexed connection with circuit breaker protection. A dropped
//! connection is discarded so the next call reconnects.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisError, RedisResult};
use tokio::sync::RwLock;

use crate::config::RedisConfig;
use crate::infrastructure::circuit_breaker::{CircuitBreaker, CircuitState};

/// Error type for Redis pool operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    #[error("Circuit breaker is open")]
    CircuitOpen,
}

/// Redis connection pool for document operations.
pub struct RedisPool {
    client: Client,
    connection: RwLock<Option<MultiplexedConnection>>,
    circuit_breaker: Arc<CircuitBreaker>,
    connected: AtomicBool,
    config: RedisConfig,
}

impl RedisPool {
    /// Create a new pool. No connection is made until the first command.
    pub fn new(config: RedisConfig, circuit_breaker: Arc<CircuitBreaker>) -> Result<Self, PoolError> {
        let client = Client::open(config.url.as_str())?;

        Ok(Self {
            client,
            connection: RwLock::new(None),
            circuit_breaker,
            connected: AtomicBool::new(false),
            config,
        })
    }

    async fn get_connection(&self) -> Result<MultiplexedConnection, PoolError> {
        if !self.circuit_breaker.allow_request() {
            return Err(PoolError::CircuitOpen);
        }

        {
            let conn = self.connection.read().await;
            if let Some(ref c) = *conn {
                return Ok(c.clone());
            }
        }

        let mut conn_guard = self.connection.write().await;

        // Another task may have connected while we waited for the write lock
        if let Some(ref c) = *conn_guard {
            return Ok(c.clone());
        }

        match self.client.get_multiplexed_tokio_connection().await {
            Ok(conn) => {
                *conn_guard = Some(conn.clone());
                self.connected.store(true, Ordering::Release);
                tracing::info!(url = %self.config.url, "Redis pool connection established");
                Ok(conn)
            }
            Err(e) => {
                self.circuit_breaker.record_failure();
                tracing::error!(error = %e, "Failed to connect to Redis");
                Err(PoolError::Redis(e))
            }
        }
    }

    /// Run a command with connection management and circuit breaker recording.
    pub async fn execute<F, T, Fut>(&self, f: F) -> Result<T, PoolError>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let conn = self.get_connection().await?;

        match f(conn).await {
            Ok(result) => {
                self.circuit_breaker.record_success();
                Ok(result)
            }
            Err(e) => {
                if e.is_connection_dropped() || e.is_io_error() {
                    *self.connection.write().await = None;
                    self.connected.store(false, Ordering::Release);
                }
                self.circuit_breaker.record_failure();
                Err(PoolError::Redis(e))
            }
        }
    }

    pub async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), PoolError> {
        self.execute(|mut conn| async move { conn.hset::<_, _, _, ()>(key, field, value).await })
            .await
    }

    pub async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, PoolError> {
        self.execute(|mut conn| async move { conn.hget(key, field).await })
            .await
    }

    pub async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>, PoolError> {
        self.execute(|mut conn| async move { conn.hgetall(key).await })
            .await
    }

    pub async fn ping(&self) -> Result<(), PoolError> {
        self.execute(|mut conn| async move {
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    /// Connected and the breaker is closed.
    pub fn is_healthy(&self) -> bool {
        self.connected.load(Ordering::Acquire) && self.circuit_state() == CircuitState::Closed
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state()
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::circuit_breaker::CircuitBreakerConfig;

    fn create_test_pool() -> (RedisPool, Arc<CircuitBreaker>) {
        let config = RedisConfig::default();
        let cb = Arc::new(CircuitBreaker::new("redis", CircuitBreakerConfig::from(&config)));
        (RedisPool::new(config, cb.clone()).unwrap(), cb)
    }

    #[test]
    fn test_pool_creation_is_lazy() {
        let (pool, _) = create_test_pool();
        assert_eq!(pool.url(), "redis://localhost:6379");
        assert!(!pool.is_healthy());
    }

    #[tokio::test]
    async fn test_open_circuit_rejects_without_connecting() {
        let (pool, cb) = create_test_pool();
        for _ in 0..5 {
            cb.record_failure();
        }

        assert_eq!(pool.circuit_state(), CircuitState::Open);
        let err = pool.hget("bcs:settings", "bot.state").await.unwrap_err();
        assert!(matches!(err, PoolError::CircuitOpen));
    }
}
