//! Redis-based document backend using one hash per collection.
//!
//! Each collection is stored as `{prefix}:{namespace}:{collection}`, with the
//! document key as hash field and the JSON-encoded document as value.

use std::sync::Arc;

use async_trait::async_trait;

use crate::redis::{PoolError, RedisPool};

use super::backend::{DocumentBackend, StorageError};

pub struct RedisBackend {
    pool: Arc<RedisPool>,
    prefix: String,
    namespace: String,
}

impl RedisBackend {
    pub fn new(pool: Arc<RedisPool>, prefix: String, namespace: String) -> Self {
        Self {
            pool,
            prefix,
            namespace,
        }
    }

    fn collection_key(&self, collection: &str) -> String {
        format!("{}:{}:{}", self.prefix, self.namespace, collection)
    }

    pub(crate) fn map_error(err: PoolError) -> StorageError {
        match err {
            PoolError::Redis(e) => StorageError::Redis(e),
            PoolError::CircuitOpen => {
                StorageError::Unavailable("Redis circuit breaker is open".to_string())
            }
        }
    }
}

#[async_trait]
impl DocumentBackend for RedisBackend {
    fn backend_type(&self) -> &'static str {
        "redis"
    }

    async fn put(
        &self,
        collection: &str,
        key: &str,
        document: serde_json::Value,
    ) -> Result<(), StorageError> {
        let hash = self.collection_key(collection);
        let json = serde_json::to_string(&document)?;

        self.pool
            .hset(&hash, key, &json)
            .await
            .map_err(Self::map_error)?;

        tracing::debug!(hash = %hash, key = %key, "Document stored in Redis");
        Ok(())
    }

    async fn get(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StorageError> {
        let hash = self.collection_key(collection);

        match self.pool.hget(&hash, key).await.map_err(Self::map_error)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn scan_prefix(
        &self,
        collection: &str,
        prefix: &str,
    ) -> Result<Vec<(String, serde_json::Value)>, StorageError> {
        let hash = self.collection_key(collection);

        // Collections are small (tens of entries), so filter client-side
        let entries = self.pool.hgetall(&hash).await.map_err(Self::map_error)?;

        let mut documents = Vec::with_capacity(entries.len());
        for (key, json) in entries {
            if !key.starts_with(prefix) {
                continue;
            }
            documents.push((key, serde_json::from_str(&json)?));
        }
        documents.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(documents)
    }
}
