//! Message templates addressed by route.
//!
//! This module provides:
//! - Template records with `${NAME}` placeholders and soft deletion
//! - A store that indexes live templates by route over a document backend
//! - A single-pass substitution engine for rendering
//!
//! # Example
//!
//! ```ignore
//! let store = TemplateStore::new(backend, Duration::from_secs(2));
//! store.upsert(Template::new("/balance", "Balance", "You have ${BALANCE}")).await?;
//!
//! let template = store.get_by_route("/balance")?;
//! let text = template.render(&HashMap::from([("BALANCE", "10 USD")]));
//! ```

mod render;
mod store;
mod types;

pub use render::{is_placeholder_name, placeholders, render_report, substitute};
pub use store::TemplateStore;
pub use types::{RenderedTemplate, Template, TemplateError, TemplateResult};
