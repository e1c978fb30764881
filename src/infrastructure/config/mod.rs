mod settings;

pub use settings::{
    DatabaseConfig, LogConfig, OtelConfig, RedisConfig, RegistryConfig, SeedConfig, Settings,
    StorageConfig,
};
