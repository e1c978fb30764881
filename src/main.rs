use std::sync::Arc;

use anyhow::{Context, Result};

use bot_content_store::config::Settings;
use bot_content_store::error::AppError;
use bot_content_store::registry::ConfigRegistry;
use bot_content_store::seed::{default_seed, load_from_path, Seeder};
use bot_content_store::storage::create_backend;
use bot_content_store::telemetry::init_telemetry;
use bot_content_store::template::{placeholders, TemplateStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new().context("Failed to load configuration")?;

    // Initialize tracing
    let _telemetry = init_telemetry(&settings.otel, &settings.log)?;
    tracing::info!(
        backend = %settings.storage.backend,
        namespace = %settings.storage.namespace,
        "Configuration loaded"
    );

    if let Err(e) = run(&settings).await {
        tracing::error!(code = e.code(), error = %e, "Seeding run failed");
        return Err(e.into());
    }

    Ok(())
}

async fn run(settings: &Settings) -> Result<(), AppError> {
    let backend = create_backend(settings).await?;
    let timeout = settings.storage.operation_timeout();

    let templates = Arc::new(TemplateStore::new(backend.clone(), timeout));
    let registry = Arc::new(ConfigRegistry::new(
        backend.clone(),
        timeout,
        &settings.registry,
    ));

    let existing_templates = templates.load().await?;
    let existing_settings = registry.load().await?;
    tracing::info!(
        templates = existing_templates,
        settings = existing_settings,
        "Stores hydrated"
    );

    if settings.seed.enabled {
        let data = match &settings.seed.path {
            Some(path) => {
                tracing::info!(path = %path, "Loading seed file");
                load_from_path(path)?
            }
            None => default_seed()?,
        };

        Seeder::new(templates.clone(), registry.clone(), backend.clone(), timeout)
            .overwrite_settings(settings.seed.overwrite_settings)
            .run(&data)
            .await?;
    } else {
        tracing::info!("Seeding disabled");
    }

    for template in templates.list(false) {
        tracing::info!(
            route = %template.route,
            title = %template.title,
            placeholders = ?placeholders(&template.body),
            "Template"
        );
    }

    let exported = registry.export();
    for (key, value) in &exported {
        tracing::info!(key = %key, value = %value, "Setting");
    }

    tracing::info!(
        templates = templates.list(false).len(),
        settings = registry.len(),
        redacted = registry.len().saturating_sub(exported.len()),
        backend = backend.backend_type(),
        "Content store ready"
    );

    Ok(())
}
