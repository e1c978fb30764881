//! Redis connectivity for the Redis document backend.

pub mod pool;

pub use pool::{PoolError, RedisPool};
