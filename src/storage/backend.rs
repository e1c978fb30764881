//! Backend trait for document storage.
//!
//! Templates, settings and the run-time record are all stored as JSON
//! documents addressed by `(collection, key)`. The stores only need three
//! primitives from the persistence layer: insert-or-replace by key, find by
//! key, and find all documents whose key starts with a prefix.

use async_trait::async_trait;
use thiserror::Error;

/// Collection holding template documents, keyed by template id.
pub const TEMPLATES_COLLECTION: &str = "pages";

/// Collection holding setting documents, keyed by setting key.
pub const SETTINGS_COLLECTION: &str = "settings";

/// Collection holding the initialization timestamp record.
pub const RUN_TIME_COLLECTION: &str = "run_time";

/// Errors that can occur during backend operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Redis operation failed
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// PostgreSQL operation failed
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// Document could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend is temporarily unavailable (e.g., circuit breaker open)
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Operation did not complete within the configured bound
    #[error("Backend operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout { operation: &'static str, timeout_ms: u64 },
}

impl StorageError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            StorageError::Redis(_) => "redis",
            StorageError::Postgres(_) => "postgres",
            StorageError::Serialization(_) => "serialization",
            StorageError::Unavailable(_) => "unavailable",
            StorageError::Timeout { .. } => "timeout",
        }
    }
}

/// Backend trait for document storage.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; a single backend handle is shared
/// by every store built on top of it.
///
/// # Error Handling
///
/// Implementations make exactly one attempt per call and surface failures as
/// `StorageError`. Retry policy belongs to the caller.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Backend type identifier ("memory", "redis", "postgres").
    fn backend_type(&self) -> &'static str;

    /// Insert the document, replacing any existing document with the same key.
    async fn put(
        &self,
        collection: &str,
        key: &str,
        document: serde_json::Value,
    ) -> Result<(), StorageError>;

    /// Fetch a single document by key.
    async fn get(&self, collection: &str, key: &str)
        -> Result<Option<serde_json::Value>, StorageError>;

    /// Fetch every document whose key starts with `prefix`, ordered by key.
    ///
    /// An empty prefix returns the whole collection.
    async fn scan_prefix(
        &self,
        collection: &str,
        prefix: &str,
    ) -> Result<Vec<(String, serde_json::Value)>, StorageError>;
}
