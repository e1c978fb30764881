//! PostgreSQL connection pooling for the PostgreSQL document backend.

pub mod pool;

pub use pool::{mask_database_url, PostgresPool, PostgresPoolError};
