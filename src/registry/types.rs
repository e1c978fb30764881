//! Setting types and error definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::storage::StorageError;

/// Registry-specific error type
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Setting not found: {0}")]
    NotFound(String),

    /// The raw value is kept for the caller but left out of the message,
    /// since it may belong to a sensitive key.
    #[error("Setting {key} could not be parsed: {reason}")]
    Parse {
        key: String,
        raw: String,
        reason: String,
    },

    #[error("Invalid setting: {0}")]
    Validation(String),

    #[error("Registry backend error: {0}")]
    Backend(#[from] StorageError),
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// A stored setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setting {
    pub id: Uuid,
    pub key: String,
    /// Raw string value, interpreted by the reader
    pub value: String,
    /// Registry-wide monotonic version of the last write
    #[serde(default)]
    pub version: u64,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// Event delivered to watch subscribers after a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingChange {
    pub key: String,
    pub value: String,
    pub version: u64,
}

impl From<&Setting> for SettingChange {
    fn from(setting: &Setting) -> Self {
        Self {
            key: setting.key.clone(),
            value: setting.value.clone(),
            version: setting.version,
        }
    }
}

/// Reject keys that are empty or whitespace-only.
pub fn validate_key(key: &str) -> RegistryResult<()> {
    if key.trim().is_empty() {
        return Err(RegistryError::Validation(
            "Key must not be empty".to_string(),
        ));
    }
    Ok(())
}
