//! Key/value configuration registry over a document backend

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use futures::Stream;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::RegistryConfig;
use crate::metrics::SETTINGS_UPDATES_TOTAL;
use crate::storage::{bounded, DocumentBackend, StorageError, SETTINGS_COLLECTION};

use super::types::{validate_key, RegistryError, RegistryResult, Setting, SettingChange};
use super::watch::{self, WatchHub};

/// Configuration registry.
///
/// Reads are served from a `DashMap` cache. Writes to the same key are
/// serialized by a per-key lock, which is also held while the change is
/// published, so subscribers see same-key changes in write order.
pub struct ConfigRegistry {
    backend: Arc<dyn DocumentBackend>,
    timeout: Duration,
    settings: DashMap<String, Setting>,
    key_locks: DashMap<String, Arc<Mutex<()>>>,
    version: AtomicU64,
    watchers: Arc<WatchHub>,
    sensitive_prefixes: Vec<String>,
}

impl ConfigRegistry {
    pub fn new(backend: Arc<dyn DocumentBackend>, timeout: Duration, config: &RegistryConfig) -> Self {
        Self {
            backend,
            timeout,
            settings: DashMap::new(),
            key_locks: DashMap::new(),
            version: AtomicU64::new(0),
            watchers: Arc::new(WatchHub::new()),
            sensitive_prefixes: config.sensitive_prefixes.clone(),
        }
    }

    /// Hydrate the cache from the backend. Returns the number of settings loaded.
    ///
    /// The version counter resumes after the highest stored version.
    #[tracing::instrument(skip(self))]
    pub async fn load(&self) -> RegistryResult<usize> {
        let backend = self.backend.clone();
        let documents = bounded(
            self.backend.backend_type(),
            "scan_prefix",
            self.timeout,
            async move { backend.scan_prefix(SETTINGS_COLLECTION, "").await },
        )
        .await?;

        let mut loaded = 0;
        for (key, document) in documents {
            let setting: Setting = match serde_json::from_value(document) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Skipping undecodable setting document");
                    continue;
                }
            };
            self.version.fetch_max(setting.version, Ordering::AcqRel);
            self.settings.insert(setting.key.clone(), setting);
            loaded += 1;
        }

        tracing::info!(count = loaded, "Settings loaded");
        Ok(loaded)
    }

    /// Raw value for `key`.
    pub async fn get(&self, key: &str) -> RegistryResult<String> {
        self.get_setting(key).await.map(|s| s.value)
    }

    /// Full record for `key`, consulting the backend on a cache miss.
    pub async fn get_setting(&self, key: &str) -> RegistryResult<Setting> {
        if let Some(setting) = self.settings.get(key) {
            return Ok(setting.clone());
        }

        match self.fetch(key).await? {
            Some(setting) => {
                // A concurrent write may have cached a newer record meanwhile
                let cached = self
                    .settings
                    .entry(key.to_string())
                    .or_insert(setting)
                    .value()
                    .clone();
                Ok(cached)
            }
            None => Err(RegistryError::NotFound(key.to_string())),
        }
    }

    /// Value for `key` converted by `parser`.
    pub async fn get_typed<T, E, F>(&self, key: &str, parser: F) -> RegistryResult<T>
    where
        F: FnOnce(&str) -> Result<T, E>,
        E: Display,
    {
        let raw = self.get(key).await?;
        parser(&raw).map_err(|e| RegistryError::Parse {
            key: key.to_string(),
            reason: e.to_string(),
            raw,
        })
    }

    /// Value for `key` converted with `FromStr`.
    pub async fn get_parsed<T>(&self, key: &str) -> RegistryResult<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get_typed(key, |raw| raw.trim().parse::<T>()).await
    }

    pub fn contains(&self, key: &str) -> bool {
        self.settings.contains_key(key)
    }

    /// Number of cached settings.
    pub fn len(&self) -> usize {
        self.settings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }

    /// Insert or update `key`.
    #[tracing::instrument(skip(self, value))]
    pub async fn set(&self, key: &str, value: impl Into<String>) -> RegistryResult<Setting> {
        validate_key(key)?;
        let value = value.into();
        let lock = self.key_lock(key);
        let result = {
            let _guard = lock.lock().await;
            self.set_locked(key, value).await
        };
        self.release_key_lock(key, lock);
        result
    }

    /// Write a setting with a known id.
    ///
    /// If the key already exists and `overwrite` is false, the stored record
    /// is kept and `None` is returned.
    #[tracing::instrument(skip(self, value))]
    pub async fn import(
        &self,
        id: Uuid,
        key: &str,
        value: impl Into<String>,
        overwrite: bool,
    ) -> RegistryResult<Option<Setting>> {
        validate_key(key)?;
        let value = value.into();
        let lock = self.key_lock(key);
        let result = {
            let _guard = lock.lock().await;
            self.import_locked(id, key, value, overwrite).await
        };
        self.release_key_lock(key, lock);
        result
    }

    /// Stream of changes to keys starting with `prefix`.
    ///
    /// The subscription is registered immediately. Each call creates an
    /// independent subscription.
    pub fn watch(&self, prefix: &str) -> impl Stream<Item = SettingChange> + Send + 'static {
        watch::subscribe(self.watchers.clone(), prefix.to_string())
    }

    pub fn subscriber_count(&self) -> usize {
        self.watchers.len()
    }

    /// Whether `key` falls under a sensitive prefix.
    pub fn is_sensitive(&self, key: &str) -> bool {
        self.sensitive_prefixes
            .iter()
            .any(|prefix| key.starts_with(prefix.as_str()))
    }

    /// All non-sensitive settings as `key -> value`.
    pub fn export(&self) -> BTreeMap<String, String> {
        self.settings
            .iter()
            .filter(|entry| !self.is_sensitive(entry.key()))
            .map(|entry| (entry.key().clone(), entry.value().value.clone()))
            .collect()
    }

    async fn set_locked(&self, key: &str, value: String) -> RegistryResult<Setting> {
        let id = match self.settings.get(key).map(|s| s.id) {
            Some(id) => id,
            None => self.fetch(key).await?.map(|s| s.id).unwrap_or_else(Uuid::new_v4),
        };

        self.write(id, key, value).await
    }

    async fn import_locked(
        &self,
        id: Uuid,
        key: &str,
        value: String,
        overwrite: bool,
    ) -> RegistryResult<Option<Setting>> {
        if !overwrite {
            let exists = self.settings.contains_key(key) || self.fetch(key).await?.is_some();
            if exists {
                tracing::debug!("Setting exists, keeping stored value");
                return Ok(None);
            }
        }

        self.write(id, key, value).await.map(Some)
    }

    /// Must be called with the key lock held.
    async fn write(&self, id: Uuid, key: &str, value: String) -> RegistryResult<Setting> {
        let setting = Setting {
            id,
            key: key.to_string(),
            value,
            version: self.version.fetch_add(1, Ordering::AcqRel) + 1,
            updated_at: Utc::now(),
        };

        let document = serde_json::to_value(&setting).map_err(StorageError::from)?;
        let backend = self.backend.clone();
        let doc_key = key.to_string();
        bounded(self.backend.backend_type(), "put", self.timeout, async move {
            backend.put(SETTINGS_COLLECTION, &doc_key, document).await
        })
        .await?;

        self.settings.insert(setting.key.clone(), setting.clone());
        SETTINGS_UPDATES_TOTAL.inc();
        self.watchers.publish(&SettingChange::from(&setting));

        if self.is_sensitive(key) {
            tracing::info!(key = %key, version = setting.version, "Setting updated (value redacted)");
        } else {
            tracing::info!(
                key = %key,
                value = %setting.value,
                version = setting.version,
                "Setting updated"
            );
        }

        Ok(setting)
    }

    async fn fetch(&self, key: &str) -> RegistryResult<Option<Setting>> {
        let backend = self.backend.clone();
        let doc_key = key.to_string();
        let document = bounded(self.backend.backend_type(), "get", self.timeout, async move {
            backend.get(SETTINGS_COLLECTION, &doc_key).await
        })
        .await?;

        match document {
            Some(document) => {
                let setting: Setting =
                    serde_json::from_value(document).map_err(StorageError::from)?;
                Ok(Some(setting))
            }
            None => Ok(None),
        }
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.key_locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the lock entry for `key` once no other writer holds or awaits it.
    fn release_key_lock(&self, key: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.key_locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{parse_bool, parse_int};
    use crate::storage::MemoryBackend;
    use futures::StreamExt;

    fn registry() -> ConfigRegistry {
        ConfigRegistry::new(
            Arc::new(MemoryBackend::new()),
            Duration::from_secs(1),
            &RegistryConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let registry = registry();
        let saved = registry.set("order.timeout", "60").await.unwrap();
        assert_eq!(saved.version, 1);

        assert_eq!(registry.get("order.timeout").await.unwrap(), "60");
        assert!(registry.contains("order.timeout"));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let registry = registry();
        assert!(matches!(
            registry.get("nope").await,
            Err(RegistryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_keeps_id_and_bumps_version() {
        let registry = registry();
        let first = registry.set("spam.ban", "999").await.unwrap();
        let second = registry.set("spam.ban", "1000").await.unwrap();

        assert_eq!(first.id, second.id);
        assert!(second.version > first.version);
        assert_eq!(registry.get("spam.ban").await.unwrap(), "1000");
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let backend = Arc::new(MemoryBackend::new());
        let registry = ConfigRegistry::new(
            backend.clone(),
            Duration::from_secs(1),
            &RegistryConfig::default(),
        );

        assert!(matches!(
            registry.set("  ", "x").await,
            Err(RegistryError::Validation(_))
        ));
        assert_eq!(backend.document_count(SETTINGS_COLLECTION), 0);
    }

    #[tokio::test]
    async fn test_get_typed() {
        let registry = registry();
        registry.set("order.timeout", "60").await.unwrap();

        assert_eq!(registry.get_typed("order.timeout", parse_int).await.unwrap(), 60);

        match registry.get_typed("order.timeout", parse_bool).await {
            Err(RegistryError::Parse { key, raw, .. }) => {
                assert_eq!(key, "order.timeout");
                assert_eq!(raw, "60");
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_parse_error_hides_sensitive_value() {
        let registry = registry();
        registry.set("bot.token", "123456:supersecret").await.unwrap();

        match registry.get_typed("bot.token", parse_bool).await {
            Err(e @ RegistryError::Parse { .. }) => {
                let message = e.to_string();
                assert!(message.contains("bot.token"));
                assert!(!message.contains("supersecret"), "{}", message);
                if let RegistryError::Parse { raw, .. } = e {
                    assert_eq!(raw, "123456:supersecret");
                }
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_key_locks_released_after_writes() {
        let registry = Arc::new(registry());

        let writers: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    registry.set(&format!("spam.key{}", i % 3), i.to_string()).await
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }
        registry.import(Uuid::new_v4(), "bot.state", "1", false).await.unwrap();
        assert!(registry.set("", "x").await.is_err());

        assert_eq!(registry.len(), 4);
        assert!(registry.key_locks.is_empty());
    }

    #[tokio::test]
    async fn test_get_parsed() {
        let registry = registry();
        registry.set("payment.min_confirmations", "1").await.unwrap();

        let n: u32 = registry.get_parsed("payment.min_confirmations").await.unwrap();
        assert_eq!(n, 1);
        assert!(registry.get_parsed::<f64>("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_export_redacts_sensitive() {
        let registry = registry();
        registry.set("bot.token", "123:abc").await.unwrap();
        registry.set("bot.state", "1").await.unwrap();
        registry.set("secret.api_key", "k").await.unwrap();

        let exported = registry.export();
        assert_eq!(exported.len(), 1);
        assert_eq!(exported.get("bot.state").map(String::as_str), Some("1"));
        assert!(registry.is_sensitive("bot.token"));
        assert!(!registry.is_sensitive("bot.state"));
    }

    #[tokio::test]
    async fn test_import_respects_overwrite() {
        let registry = registry();
        let id = Uuid::new_v4();

        let created = registry.import(id, "bot.state", "1", false).await.unwrap();
        assert_eq!(created.map(|s| s.id), Some(id));

        registry.set("bot.state", "0").await.unwrap();
        assert!(registry
            .import(id, "bot.state", "1", false)
            .await
            .unwrap()
            .is_none());
        assert_eq!(registry.get("bot.state").await.unwrap(), "0");

        registry.import(id, "bot.state", "1", true).await.unwrap();
        assert_eq!(registry.get("bot.state").await.unwrap(), "1");
    }

    #[tokio::test]
    async fn test_get_falls_back_to_backend() {
        let backend = Arc::new(MemoryBackend::new());
        let writer = ConfigRegistry::new(backend.clone(), Duration::from_secs(1), &RegistryConfig::default());
        writer.set("bot.message", "hello").await.unwrap();

        let reader = ConfigRegistry::new(backend, Duration::from_secs(1), &RegistryConfig::default());
        assert!(!reader.contains("bot.message"));
        assert_eq!(reader.get("bot.message").await.unwrap(), "hello");
        assert!(reader.contains("bot.message"));
    }

    #[tokio::test]
    async fn test_load_resumes_version() {
        let backend = Arc::new(MemoryBackend::new());
        let writer = ConfigRegistry::new(backend.clone(), Duration::from_secs(1), &RegistryConfig::default());
        writer.set("a", "1").await.unwrap();
        writer.set("b", "2").await.unwrap();

        let reader = ConfigRegistry::new(backend, Duration::from_secs(1), &RegistryConfig::default());
        assert_eq!(reader.load().await.unwrap(), 2);
        let next = reader.set("c", "3").await.unwrap();
        assert_eq!(next.version, 3);
    }

    #[tokio::test]
    async fn test_watch_receives_matching_changes() {
        let registry = registry();
        let mut changes = Box::pin(registry.watch("spam."));
        assert_eq!(registry.subscriber_count(), 1);

        registry.set("bot.token", "x").await.unwrap();
        registry.set("spam.ban", "1000").await.unwrap();

        let change = changes.next().await.unwrap();
        assert_eq!(change.key, "spam.ban");
        assert_eq!(change.value, "1000");

        drop(changes);
        assert_eq!(registry.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_write_not_published() {
        let backend = Arc::new(MemoryBackend::new());
        let registry = ConfigRegistry::new(backend.clone(), Duration::from_secs(1), &RegistryConfig::default());
        let mut changes = tokio_test::task::spawn(registry.watch(""));

        backend.set_unavailable(true);
        assert!(matches!(
            registry.set("bot.state", "0").await,
            Err(RegistryError::Backend(StorageError::Unavailable(_)))
        ));
        assert!(!registry.contains("bot.state"));
        tokio_test::assert_pending!(changes.poll_next());
    }
}
