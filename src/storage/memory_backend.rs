//! In-memory document backend using DashMap.
//!
//! Documents are stored in memory and will be lost on restart. Used for tests
//! and single-process deployments.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use super::backend::{DocumentBackend, StorageError};

/// In-memory document backend.
///
/// Each collection is a `BTreeMap` so prefix scans come back ordered by key.
/// Latency and outage can be injected to exercise timeout and failure paths.
pub struct MemoryBackend {
    /// Per-collection documents
    collections: DashMap<String, BTreeMap<String, serde_json::Value>>,
    /// Artificial delay applied to every call, in milliseconds
    latency_ms: AtomicU64,
    /// When set, every call fails with `StorageError::Unavailable`
    unavailable: AtomicBool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create an empty memory backend.
    pub fn new() -> Self {
        Self {
            collections: DashMap::new(),
            latency_ms: AtomicU64::new(0),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Delay every subsequent call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Release);
    }

    /// Simulate an outage (or recovery).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Release);
    }

    /// Number of documents in a collection.
    pub fn document_count(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }

    async fn simulate(&self) -> Result<(), StorageError> {
        let latency = self.latency_ms.load(Ordering::Acquire);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unavailable.load(Ordering::Acquire) {
            return Err(StorageError::Unavailable(
                "memory backend marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentBackend for MemoryBackend {
    fn backend_type(&self) -> &'static str {
        "memory"
    }

    async fn put(
        &self,
        collection: &str,
        key: &str,
        document: serde_json::Value,
    ) -> Result<(), StorageError> {
        self.simulate().await?;

        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), document);

        tracing::trace!(collection = %collection, key = %key, "Document stored in memory");
        Ok(())
    }

    async fn get(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StorageError> {
        self.simulate().await?;

        Ok(self
            .collections
            .get(collection)
            .and_then(|c| c.get(key).cloned()))
    }

    async fn scan_prefix(
        &self,
        collection: &str,
        prefix: &str,
    ) -> Result<Vec<(String, serde_json::Value)>, StorageError> {
        self.simulate().await?;

        let Some(documents) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };

        let matches = documents
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(matches)
    }
}
