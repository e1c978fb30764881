// Infrastructure layer (shared components)
pub mod infrastructure;

// Re-export infrastructure modules at the crate root
pub use infrastructure::circuit_breaker;
pub use infrastructure::config;
pub use infrastructure::error;
pub use infrastructure::postgres;
pub use infrastructure::redis;

// Domain layer
pub mod registry;
pub mod template;

// Persistence
pub mod seed;
pub mod storage;

// Supporting modules
pub mod metrics;
pub mod telemetry;
