//! Seed data for templates and settings.
//!
//! The seed document has two lists, `pages` and `settings`, in the field
//! names the bot's content database has always used (`uuid`, `link`,
//! `template`, `delete`). An embedded fixture ships with the crate; a file
//! can be supplied instead.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::registry::{ConfigRegistry, RegistryError};
use crate::storage::{bounded, DocumentBackend, StorageError, RUN_TIME_COLLECTION};
use crate::template::{Template, TemplateError, TemplateStore};

/// Key of the run-time record inside its collection.
pub const RUN_TIME_KEY: &str = "started";

const DEFAULT_FIXTURE: &str = include_str!("fixture.json");

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Failed to read seed file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed seed data: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid seed data: {0}")]
    Invalid(String),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Parsed seed document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub pages: Vec<SeedPage>,
    #[serde(default)]
    pub settings: Vec<SeedSetting>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedPage {
    #[serde(rename = "uuid")]
    pub id: Uuid,
    #[serde(rename = "link")]
    pub route: String,
    pub title: String,
    #[serde(rename = "template")]
    pub body: String,
    /// Stored as a number in older data; any non-zero value means deleted
    #[serde(rename = "delete", default, deserialize_with = "deserialize_flag")]
    pub deleted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedSetting {
    #[serde(rename = "uuid")]
    pub id: Uuid,
    pub key: String,
    pub value: String,
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Number(serde_json::Number),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(true),
    })
}

impl SeedPage {
    pub fn to_template(&self) -> Template {
        let mut template = Template::with_id(self.id, &self.route, &self.title, &self.body);
        template.deleted = self.deleted;
        template
    }
}

impl SeedData {
    pub fn from_json(json: &str) -> Result<Self, SeedError> {
        let data: SeedData = serde_json::from_str(json)?;
        data.validate()?;
        Ok(data)
    }

    /// Check that ids, setting keys and live routes are unique, and that
    /// every page is a valid template.
    pub fn validate(&self) -> Result<(), SeedError> {
        let mut ids = HashSet::new();
        let mut routes = HashSet::new();
        for page in &self.pages {
            if !ids.insert(page.id) {
                return Err(SeedError::Invalid(format!("duplicate page uuid {}", page.id)));
            }
            if !page.deleted && !routes.insert(page.route.as_str()) {
                return Err(SeedError::Invalid(format!("duplicate live route {}", page.route)));
            }
            page.to_template().validate()?;
        }

        let mut setting_ids = HashSet::new();
        let mut keys = HashSet::new();
        for setting in &self.settings {
            crate::registry::validate_key(&setting.key)?;
            if !setting_ids.insert(setting.id) {
                return Err(SeedError::Invalid(format!("duplicate setting uuid {}", setting.id)));
            }
            if !keys.insert(setting.key.as_str()) {
                return Err(SeedError::Invalid(format!("duplicate setting key {}", setting.key)));
            }
        }

        Ok(())
    }
}

/// The fixture embedded in the binary.
pub fn default_seed() -> Result<SeedData, SeedError> {
    SeedData::from_json(DEFAULT_FIXTURE)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<SeedData, SeedError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
        path: path.display().to_string(),
        source,
    })?;
    SeedData::from_json(&json)
}

/// Timestamp of the last seeding run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunTimeRecord {
    pub started_at: DateTime<Utc>,
}

/// Outcome of a seeding run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeedReport {
    pub templates_written: usize,
    /// Pages whose route is owned by a different live template
    pub templates_skipped: usize,
    pub settings_written: usize,
    /// Settings left untouched because they already existed
    pub settings_kept: usize,
    pub started_at: Option<DateTime<Utc>>,
}

/// Applies seed data to the stores.
pub struct Seeder {
    templates: Arc<TemplateStore>,
    registry: Arc<ConfigRegistry>,
    backend: Arc<dyn DocumentBackend>,
    timeout: Duration,
    overwrite_settings: bool,
}

impl Seeder {
    pub fn new(
        templates: Arc<TemplateStore>,
        registry: Arc<ConfigRegistry>,
        backend: Arc<dyn DocumentBackend>,
        timeout: Duration,
    ) -> Self {
        Self {
            templates,
            registry,
            backend,
            timeout,
            overwrite_settings: false,
        }
    }

    /// Replace existing settings instead of keeping them.
    pub fn overwrite_settings(mut self, overwrite: bool) -> Self {
        self.overwrite_settings = overwrite;
        self
    }

    /// Write every page and setting, then the run-time record.
    ///
    /// Running twice with the same data leaves the stores unchanged apart
    /// from timestamps and versions.
    #[tracing::instrument(skip(self, data), fields(pages = data.pages.len(), settings = data.settings.len()))]
    pub async fn run(&self, data: &SeedData) -> Result<SeedReport, SeedError> {
        let mut report = SeedReport::default();

        for page in &data.pages {
            match self.templates.upsert(page.to_template()).await {
                Ok(_) => report.templates_written += 1,
                Err(TemplateError::Conflict { route, existing_id }) => {
                    tracing::warn!(
                        route = %route,
                        existing_id = %existing_id,
                        seed_id = %page.id,
                        "Route owned by another template, skipping seed page"
                    );
                    report.templates_skipped += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        for setting in &data.settings {
            let written = self
                .registry
                .import(setting.id, &setting.key, setting.value.as_str(), self.overwrite_settings)
                .await?;
            match written {
                Some(_) => report.settings_written += 1,
                None => report.settings_kept += 1,
            }
        }

        let record = self.record_run_time().await?;
        report.started_at = Some(record.started_at);

        tracing::info!(
            templates_written = report.templates_written,
            templates_skipped = report.templates_skipped,
            settings_written = report.settings_written,
            settings_kept = report.settings_kept,
            "Seed applied"
        );

        Ok(report)
    }

    async fn record_run_time(&self) -> Result<RunTimeRecord, SeedError> {
        let record = RunTimeRecord {
            started_at: Utc::now(),
        };
        let document = serde_json::to_value(&record)?;
        let backend = self.backend.clone();

        bounded(self.backend.backend_type(), "put", self.timeout, async move {
            backend.put(RUN_TIME_COLLECTION, RUN_TIME_KEY, document).await
        })
        .await?;

        Ok(record)
    }
}
