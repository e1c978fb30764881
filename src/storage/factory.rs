//! Document backend factory

use std::sync::Arc;

use crate::config::Settings;
use crate::infrastructure::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::postgres::PostgresPool;
use crate::redis::RedisPool;

use super::backend::{DocumentBackend, StorageError};
use super::bounded;
use super::memory_backend::MemoryBackend;
use super::postgres_backend::PostgresBackend;
use super::redis_backend::RedisBackend;

/// Create a document backend based on configuration.
///
/// Returns the implementation named by `storage.backend`:
/// - `"postgres"`: `PostgresBackend`, with the documents table created if missing
/// - `"redis"`: `RedisBackend`, after a successful `PING`
/// - `"memory"` (default): `MemoryBackend`
///
/// A persistent backend that cannot be reached is an error; it never degrades
/// to memory, which would silently drop every write. An unrecognised name
/// falls back to memory with a warning.
pub async fn create_backend(settings: &Settings) -> Result<Arc<dyn DocumentBackend>, StorageError> {
    let namespace = settings.storage.namespace.clone();
    let breaker_config = CircuitBreakerConfig::from(&settings.redis);

    match settings.storage.backend.as_str() {
        "postgres" => {
            let breaker = Arc::new(CircuitBreaker::new("postgres", breaker_config));
            let pool = PostgresPool::connect(&settings.database, breaker)
                .await
                .map_err(PostgresBackend::map_error)?;

            let backend = PostgresBackend::new(pool, namespace.clone());
            backend.ensure_schema().await?;

            tracing::info!(
                backend = "postgres",
                namespace = %namespace,
                "Creating PostgreSQL document backend"
            );
            Ok(Arc::new(backend))
        }
        "redis" => {
            let breaker = Arc::new(CircuitBreaker::new("redis", breaker_config));
            let pool = Arc::new(
                RedisPool::new(settings.redis.clone(), breaker).map_err(RedisBackend::map_error)?,
            );

            let ping_pool = pool.clone();
            bounded("redis", "ping", settings.storage.operation_timeout(), async move {
                ping_pool.ping().await.map_err(RedisBackend::map_error)
            })
            .await?;

            tracing::info!(
                backend = "redis",
                prefix = %settings.redis.key_prefix,
                namespace = %namespace,
                "Creating Redis document backend"
            );
            Ok(Arc::new(RedisBackend::new(
                pool,
                settings.redis.key_prefix.clone(),
                namespace,
            )))
        }
        "memory" => {
            tracing::info!(backend = "memory", "Creating memory document backend");
            Ok(Arc::new(MemoryBackend::new()))
        }
        other => {
            tracing::warn!(
                backend = %other,
                "Unknown storage backend, using memory"
            );
            Ok(Arc::new(MemoryBackend::new()))
        }
    }
}
