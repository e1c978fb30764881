//! Document persistence for templates, settings and the run-time record.
//!
//! The stores talk to persistence only through [`DocumentBackend`]. Every call
//! they make goes through [`bounded`], so a stalled backend surfaces as
//! [`StorageError::Timeout`] instead of blocking the caller.

mod backend;
mod factory;
mod memory_backend;
mod postgres_backend;
mod redis_backend;

use std::future::Future;
use std::time::{Duration, Instant};

pub use backend::{
    DocumentBackend, StorageError, RUN_TIME_COLLECTION, SETTINGS_COLLECTION, TEMPLATES_COLLECTION,
};
pub use factory::create_backend;
pub use memory_backend::MemoryBackend;
pub use postgres_backend::PostgresBackend;
pub use redis_backend::RedisBackend;

use crate::metrics::{STORAGE_ERRORS_TOTAL, STORAGE_OPERATION_DURATION};

/// Run a single backend call with an upper time bound.
///
/// Records latency and failures under the backend's type label.
pub async fn bounded<T, F>(
    backend_type: &'static str,
    operation: &'static str,
    timeout: Duration,
    call: F,
) -> Result<T, StorageError>
where
    F: Future<Output = Result<T, StorageError>>,
{
    let start = Instant::now();

    let result = match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Timeout {
            operation,
            timeout_ms: timeout.as_millis() as u64,
        }),
    };

    STORAGE_OPERATION_DURATION
        .with_label_values(&[backend_type, operation])
        .observe(start.elapsed().as_secs_f64());

    if let Err(ref e) = result {
        STORAGE_ERRORS_TOTAL
            .with_label_values(&[backend_type, e.kind()])
            .inc();
        tracing::warn!(
            backend = backend_type,
            operation = operation,
            error = %e,
            "Backend operation failed"
        );
    }

    result
}
