//! Portfolio API server
//!
//! Admin API for managing API keys plus a key-gated public REST API for
//! posts and users. Exposed as a library so integration tests can build the
//! full application with in-memory backends.

pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;

use shared::rate_limit::RequestCounter;
use shared::{Config, DbPool};
use std::sync::Arc;

use crate::repositories::Stores;
use crate::services::{ApiKeyService, UsageLogger};

/// Shared application state, one per server
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub stores: Stores,
    pub api_keys: ApiKeyService,
    pub usage: UsageLogger,
    pub counter: Arc<dyn RequestCounter>,
    /// Present only for the Postgres backend; drives the health check
    pub db: Option<DbPool>,
}

impl AppState {
    pub fn new(
        config: Config,
        stores: Stores,
        api_keys: ApiKeyService,
        counter: Arc<dyn RequestCounter>,
        db: Option<DbPool>,
    ) -> Self {
        let usage = UsageLogger::new(stores.usage.clone(), stores.api_keys.clone());
        Self {
            config,
            stores,
            api_keys,
            usage,
            counter,
            db,
        }
    }
}
