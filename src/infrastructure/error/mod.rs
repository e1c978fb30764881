use thiserror::Error;

use crate::registry::RegistryError;
use crate::seed::SeedError;
use crate::storage::StorageError;
use crate::telemetry::TelemetryError;
use crate::template::TemplateError;

/// Top-level error for the seeding binary.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Seed error: {0}")]
    Seed(#[from] SeedError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
}

impl AppError {
    /// Stable code for logs and exit summaries.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Storage(_) => "STORAGE_ERROR",
            AppError::Template(TemplateError::Conflict { .. }) => "ROUTE_CONFLICT",
            AppError::Template(_) => "TEMPLATE_ERROR",
            AppError::Registry(_) => "REGISTRY_ERROR",
            AppError::Seed(_) => "SEED_ERROR",
            AppError::Telemetry(_) => "TELEMETRY_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions_and_codes() {
        let err: AppError = StorageError::Unavailable("down".to_string()).into();
        assert_eq!(err.code(), "STORAGE_ERROR");
        assert!(err.to_string().contains("down"));

        let err: AppError = TemplateError::Conflict {
            route: "/start".to_string(),
            existing_id: uuid::Uuid::nil(),
        }
        .into();
        assert_eq!(err.code(), "ROUTE_CONFLICT");

        let err: AppError = RegistryError::NotFound("bot.state".to_string()).into();
        assert_eq!(err.code(), "REGISTRY_ERROR");
    }
}
