//! Shared library for the portfolio backend
//!
//! This crate provides common functionality used by the API server:
//! - Database connection pooling and utilities
//! - Common data models matching the PostgreSQL schema
//! - Error handling types
//! - Configuration management
//! - Logging infrastructure
//! - Request-rate counters (in-memory and Redis-backed)

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod rate_limit;

// Re-export commonly used types
pub use config::Config;
pub use db::DbPool;
pub use error::{Error, Result};
pub use models::{ApiKey, ApiUsageLog, Permission, PermissionSet, Post, User};
pub use rate_limit::{MemoryCounter, RateDecision, RateScope, RedisCounter, RequestCounter};

/// Initialize tracing subscriber for structured logging
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shared=debug,api_server=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
