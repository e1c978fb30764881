//! Route-addressed template storage over a document backend

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::metrics::{TEMPLATE_LOOKUPS_TOTAL, TEMPLATE_WRITES_REJECTED_TOTAL};
use crate::storage::{bounded, DocumentBackend, StorageError, TEMPLATES_COLLECTION};

use super::types::{RenderedTemplate, Template, TemplateError, TemplateResult};

/// Template storage.
///
/// Reads are served from an in-memory index and never wait on writers.
/// Writes are serialized by a store-wide lock because route uniqueness is a
/// property of the whole collection, and reach the backend before the index
/// is updated.
pub struct TemplateStore {
    backend: Arc<dyn DocumentBackend>,
    timeout: Duration,
    templates: DashMap<Uuid, Template>,
    /// Route -> id, non-deleted templates only
    routes: DashMap<String, Uuid>,
    write_lock: Mutex<()>,
}

impl TemplateStore {
    pub fn new(backend: Arc<dyn DocumentBackend>, timeout: Duration) -> Self {
        Self {
            backend,
            timeout,
            templates: DashMap::new(),
            routes: DashMap::new(),
            write_lock: Mutex::new(()),
        }
    }

    /// Rebuild the index from the backend. Returns the number of templates loaded.
    ///
    /// Documents that fail to decode are skipped. If two live documents claim
    /// the same route, the first one in id order keeps it.
    #[tracing::instrument(skip(self))]
    pub async fn load(&self) -> TemplateResult<usize> {
        let _guard = self.write_lock.lock().await;

        let backend = self.backend.clone();
        let documents = bounded(
            self.backend.backend_type(),
            "scan_prefix",
            self.timeout,
            async move { backend.scan_prefix(TEMPLATES_COLLECTION, "").await },
        )
        .await?;

        self.templates.clear();
        self.routes.clear();

        for (key, document) in documents {
            let template: Template = match serde_json::from_value(document) {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Skipping undecodable template document");
                    continue;
                }
            };

            if !template.deleted {
                match self.routes.entry(template.route.clone()) {
                    Entry::Occupied(owner) => {
                        tracing::warn!(
                            route = %template.route,
                            kept = %owner.get(),
                            skipped = %template.id,
                            "Duplicate live route in backend, keeping first"
                        );
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(template.id);
                    }
                }
            }
            self.templates.insert(template.id, template);
        }

        let count = self.templates.len();
        tracing::info!(count = count, live = self.routes.len(), "Templates loaded");
        Ok(count)
    }

    /// Find the live template for `route`.
    pub fn get_by_route(&self, route: &str) -> TemplateResult<Template> {
        let found = self.routes.get(route).and_then(|id| {
            self.templates
                .get(&*id)
                .filter(|t| !t.deleted && t.route == route)
                .map(|t| t.clone())
        });

        match found {
            Some(template) => {
                TEMPLATE_LOOKUPS_TOTAL.with_label_values(&["hit"]).inc();
                Ok(template)
            }
            None => {
                TEMPLATE_LOOKUPS_TOTAL.with_label_values(&["not_found"]).inc();
                Err(TemplateError::NotFound(route.to_string()))
            }
        }
    }

    /// Fetch a template by id, deleted or not.
    ///
    /// Falls back to the backend when the id is not indexed.
    pub async fn get(&self, id: Uuid) -> TemplateResult<Template> {
        if let Some(template) = self.templates.get(&id) {
            return Ok(template.clone());
        }

        self.fetch(id)
            .await?
            .ok_or_else(|| TemplateError::NotFound(id.to_string()))
    }

    /// All indexed templates sorted by route.
    pub fn list(&self, include_deleted: bool) -> Vec<Template> {
        let mut templates: Vec<Template> = self
            .templates
            .iter()
            .filter(|entry| include_deleted || !entry.deleted)
            .map(|entry| entry.value().clone())
            .collect();
        templates.sort_by(|a, b| a.route.cmp(&b.route).then(a.id.cmp(&b.id)));
        templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Insert or replace a template by id.
    ///
    /// Fails with `Conflict` if the template is live and another live
    /// template already owns its route. `created_at` of an existing record is
    /// preserved.
    #[tracing::instrument(skip(self, template), fields(id = %template.id, route = %template.route))]
    pub async fn upsert(&self, mut template: Template) -> TemplateResult<Template> {
        if let Err(e) = template.validate() {
            TEMPLATE_WRITES_REJECTED_TOTAL.with_label_values(&["invalid"]).inc();
            return Err(e);
        }

        let _guard = self.write_lock.lock().await;

        if !template.deleted {
            self.ensure_route_free(&template.route, template.id)?;
        }

        let now = Utc::now();
        if let Some(existing) = self.templates.get(&template.id) {
            template.created_at = existing.created_at;
        }
        template.updated_at = now;

        self.persist(&template).await?;
        self.index(template.clone());

        tracing::info!(deleted = template.deleted, "Template saved");
        Ok(template)
    }

    /// Mark a template deleted. Deleting an already deleted template is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn soft_delete(&self, id: Uuid) -> TemplateResult<Template> {
        let _guard = self.write_lock.lock().await;

        let mut template = self.load_for_write(id).await?;
        if template.deleted {
            return Ok(template);
        }

        template.deleted = true;
        template.updated_at = Utc::now();

        self.persist(&template).await?;
        self.index(template.clone());

        tracing::info!(route = %template.route, "Template deleted");
        Ok(template)
    }

    /// Clear the deleted flag, provided the route is still free.
    #[tracing::instrument(skip(self))]
    pub async fn restore(&self, id: Uuid) -> TemplateResult<Template> {
        let _guard = self.write_lock.lock().await;

        let mut template = self.load_for_write(id).await?;
        if !template.deleted {
            return Ok(template);
        }

        self.ensure_route_free(&template.route, template.id)?;

        template.deleted = false;
        template.updated_at = Utc::now();

        self.persist(&template).await?;
        self.index(template.clone());

        tracing::info!(route = %template.route, "Template restored");
        Ok(template)
    }

    /// Look up the live template for `route` and render it.
    pub fn render_route<K, V>(
        &self,
        route: &str,
        bindings: &HashMap<K, V>,
    ) -> TemplateResult<RenderedTemplate>
    where
        K: Borrow<str> + Hash + Eq,
        V: AsRef<str>,
    {
        let template = self.get_by_route(route)?;
        Ok(template.render_report(bindings))
    }

    fn ensure_route_free(&self, route: &str, id: Uuid) -> TemplateResult<()> {
        match self.routes.get(route) {
            Some(owner) if *owner != id => {
                TEMPLATE_WRITES_REJECTED_TOTAL.with_label_values(&["conflict"]).inc();
                Err(TemplateError::Conflict {
                    route: route.to_string(),
                    existing_id: *owner,
                })
            }
            _ => Ok(()),
        }
    }

    async fn load_for_write(&self, id: Uuid) -> TemplateResult<Template> {
        if let Some(template) = self.templates.get(&id) {
            return Ok(template.clone());
        }
        self.fetch(id)
            .await?
            .ok_or_else(|| TemplateError::NotFound(id.to_string()))
    }

    async fn fetch(&self, id: Uuid) -> TemplateResult<Option<Template>> {
        let backend = self.backend.clone();
        let key = id.to_string();
        let document = bounded(self.backend.backend_type(), "get", self.timeout, async move {
            backend.get(TEMPLATES_COLLECTION, &key).await
        })
        .await?;

        match document {
            Some(document) => {
                let template: Template =
                    serde_json::from_value(document).map_err(StorageError::from)?;
                Ok(Some(template))
            }
            None => Ok(None),
        }
    }

    async fn persist(&self, template: &Template) -> TemplateResult<()> {
        let document = serde_json::to_value(template).map_err(StorageError::from)?;
        let backend = self.backend.clone();
        let key = template.id.to_string();

        bounded(self.backend.backend_type(), "put", self.timeout, async move {
            backend.put(TEMPLATES_COLLECTION, &key, document).await
        })
        .await?;
        Ok(())
    }

    /// Must be called with the write lock held.
    fn index(&self, template: Template) {
        let id = template.id;

        if let Some(previous) = self.templates.insert(id, template.clone()) {
            if previous.route != template.route || template.deleted {
                self.routes.remove_if(&previous.route, |_, owner| *owner == id);
            }
        }

        if template.deleted {
            self.routes.remove_if(&template.route, |_, owner| *owner == id);
        } else {
            self.routes.insert(template.route, id);
        }
    }
}
