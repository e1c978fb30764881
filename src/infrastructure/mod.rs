//! Infrastructure layer modules
//!
//! This module contains shared infrastructure components:
//! - `circuit_breaker`: failure tracking shared by the Redis and PostgreSQL pools
//! - `config`: Application configuration and settings
//! - `error`: Top-level error type for the binary
//! - `postgres`: PostgreSQL connection pool
//! - `redis`: Redis connection pool

pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod postgres;
pub mod redis;
