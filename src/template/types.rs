//! Template types and error definitions

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::storage::StorageError;

use super::render::{render_report, substitute};

/// Template-specific error type
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Route {route} is already owned by template {existing_id}")]
    Conflict { route: String, existing_id: Uuid },

    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    #[error("Template backend error: {0}")]
    Backend(#[from] StorageError),
}

/// Result type for template operations
pub type TemplateResult<T> = Result<T, TemplateError>;

/// A message template addressed by route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Stable identifier, never changes once created
    pub id: Uuid,

    /// Unique route among non-deleted templates (e.g. `/balance`)
    pub route: String,

    /// Display label, not used in rendering
    pub title: String,

    /// Markup with `${NAME}` placeholders
    pub body: String,

    /// Soft-delete flag; deleted templates are kept for audit
    #[serde(default)]
    pub deleted: bool,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Template {
    /// Create a template with a fresh id.
    pub fn new(route: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), route, title, body)
    }

    /// Create a template with a pre-generated id (seed data, imports).
    pub fn with_id(
        id: Uuid,
        route: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            route: route.into(),
            title: title.into(),
            body: body.into(),
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> TemplateResult<()> {
        if self.id.is_nil() {
            return Err(TemplateError::InvalidTemplate(
                "ID must not be nil".to_string(),
            ));
        }

        if self.route.is_empty() || !self.route.starts_with('/') {
            return Err(TemplateError::InvalidTemplate(format!(
                "Route must start with '/': {:?}",
                self.route
            )));
        }

        if self.route.chars().any(char::is_whitespace) {
            return Err(TemplateError::InvalidTemplate(format!(
                "Route must not contain whitespace: {:?}",
                self.route
            )));
        }

        if self.title.trim().is_empty() {
            return Err(TemplateError::InvalidTemplate(
                "Title must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Render the body against `bindings`. Unknown placeholders stay verbatim.
    pub fn render<K, V>(&self, bindings: &HashMap<K, V>) -> String
    where
        K: Borrow<str> + Hash + Eq,
        V: AsRef<str>,
    {
        substitute(&self.body, bindings)
    }

    /// Render and report which placeholders were left unresolved.
    pub fn render_report<K, V>(&self, bindings: &HashMap<K, V>) -> RenderedTemplate
    where
        K: Borrow<str> + Hash + Eq,
        V: AsRef<str>,
    {
        render_report(self, bindings)
    }
}

/// Output of a render, with the placeholders that had no binding.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedTemplate {
    pub template_id: Uuid,
    pub route: String,
    pub text: String,
    /// Distinct placeholder names left verbatim, in order of first occurrence
    pub unresolved: Vec<String>,
}

impl RenderedTemplate {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_validation_valid() {
        let template = Template::new("/balance", "User balance", "<p>${BALANCE}</p>");
        assert!(template.validate().is_ok());
        assert!(!template.deleted);
    }

    #[test]
    fn test_template_validation_route_without_slash() {
        let template = Template::new("balance", "User balance", "");
        assert!(matches!(
            template.validate(),
            Err(TemplateError::InvalidTemplate(_))
        ));
    }

    #[test]
    fn test_template_validation_empty_title() {
        let template = Template::new("/balance", "  ", "");
        assert!(matches!(
            template.validate(),
            Err(TemplateError::InvalidTemplate(_))
        ));
    }

    #[test]
    fn test_template_validation_nil_id() {
        let template = Template::with_id(Uuid::nil(), "/balance", "Balance", "");
        assert!(matches!(
            template.validate(),
            Err(TemplateError::InvalidTemplate(_))
        ));
    }

    #[test]
    fn test_deserialize_without_timestamps() {
        let json = r#"{
            "id": "4575abf5-e9ac-48c4-9cbf-9e5d58f29b80",
            "route": "/balance",
            "title": "User balance",
            "body": "${BALANCE}"
        }"#;

        let template: Template = serde_json::from_str(json).unwrap();
        assert_eq!(template.route, "/balance");
        assert!(!template.deleted);
    }
}
