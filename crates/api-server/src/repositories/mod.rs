//! Storage traits and backends
//!
//! Handlers and middleware depend on these traits, never on a concrete
//! backend. [`Stores`] bundles one implementation of each trait:
//! Postgres-backed for production, in-memory for tests and local demos.
//! The in-memory backend keeps state per process only and is not suitable
//! for multi-instance deployments.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::models::{ApiKey, ApiUsageLog, PermissionSet, Post, User};
use shared::{DbPool, Result};
use std::sync::Arc;

// ============================================================================
// API keys
// ============================================================================

/// Fields required to persist a new API key
#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub user_id: i64,
    pub name: String,
    /// Argon2id hash of the full key; plaintext is never stored
    pub key_hash: String,
    pub prefix: String,
    pub permissions: PermissionSet,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Partial update for an API key; absent fields are left unchanged
///
/// `expires_at` uses a double Option: `Some(None)` clears the expiry,
/// `None` leaves it as is.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyChanges {
    pub name: Option<String>,
    pub permissions: Option<PermissionSet>,
    pub enabled: Option<bool>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
}

impl ApiKeyChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.permissions.is_none()
            && self.enabled.is_none()
            && self.expires_at.is_none()
    }
}

#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    async fn insert(&self, new: NewApiKey) -> Result<ApiKey>;

    async fn find_by_id(&self, id: i64) -> Result<Option<ApiKey>>;

    /// All enabled keys sharing a prefix. Prefixes are not unique, so
    /// validation must verify the secret against every candidate.
    async fn find_enabled_by_prefix(&self, prefix: &str) -> Result<Vec<ApiKey>>;

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<ApiKey>>;

    async fn list_all(&self) -> Result<Vec<ApiKey>>;

    /// Apply a partial update; returns the updated row, or None if absent
    async fn update(&self, id: i64, changes: ApiKeyChanges) -> Result<Option<ApiKey>>;

    /// Returns true if a row was deleted
    async fn delete(&self, id: i64) -> Result<bool>;

    async fn touch_last_used(&self, id: i64, at: DateTime<Utc>) -> Result<()>;
}

// ============================================================================
// Usage logs
// ============================================================================

/// One usage log entry ready for insertion
#[derive(Debug, Clone)]
pub struct NewUsageLog {
    pub api_key_id: i64,
    pub endpoint: String,
    pub method: String,
    pub status_code: i32,
    pub response_time_ms: i32,
    pub request_ip: String,
    pub user_agent: Option<String>,
}

/// Optional time bounds for usage queries
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageWindow {
    /// Inclusive lower bound
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound
    pub to: Option<DateTime<Utc>>,
}

impl UsageWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.map(|from| at >= from).unwrap_or(true)
            && self.to.map(|to| at < to).unwrap_or(true)
    }
}

/// Aggregates over a key's usage within a window
#[derive(Debug, Clone, Default)]
pub struct UsageStats {
    pub total_requests: i64,
    /// Requests with status >= 400
    pub error_requests: i64,
    pub avg_response_time_ms: f64,
    /// (endpoint, count) pairs, highest count first
    pub requests_by_endpoint: Vec<(String, i64)>,
}

#[async_trait]
pub trait UsageLogStore: Send + Sync {
    async fn insert(&self, log: NewUsageLog) -> Result<ApiUsageLog>;

    async fn list_for_key(
        &self,
        api_key_id: i64,
        window: UsageWindow,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ApiUsageLog>>;

    async fn count_for_key(&self, api_key_id: i64, window: UsageWindow) -> Result<i64>;

    async fn stats_for_key(&self, api_key_id: i64, window: UsageWindow) -> Result<UsageStats>;
}

// ============================================================================
// Users
// ============================================================================

/// Fields required to persist a new user
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, new: NewUser) -> Result<User>;

    async fn find_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn record_login(&self, id: i64, at: DateTime<Utc>) -> Result<()>;
}

// ============================================================================
// Posts
// ============================================================================

/// Fields required to persist a new post
#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: i64,
    pub slug: String,
    pub title: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub published: bool,
}

#[async_trait]
pub trait PostStore: Send + Sync {
    /// Insert a post. Fails with a validation error if the slug is taken.
    async fn insert(&self, new: NewPost) -> Result<Post>;

    async fn find_published_by_slug(&self, slug: &str) -> Result<Option<Post>>;

    async fn list_published(&self, limit: i64, offset: i64) -> Result<Vec<Post>>;

    async fn count_published(&self) -> Result<i64>;
}

// ============================================================================
// Factory
// ============================================================================

/// Bundle of one store per entity, shared across handlers and middleware
#[derive(Clone)]
pub struct Stores {
    pub api_keys: Arc<dyn ApiKeyStore>,
    pub usage: Arc<dyn UsageLogStore>,
    pub users: Arc<dyn UserStore>,
    pub posts: Arc<dyn PostStore>,
}

impl Stores {
    /// Postgres-backed stores sharing one connection pool
    pub fn postgres(pool: DbPool) -> Self {
        Self {
            api_keys: Arc::new(postgres::PgApiKeyStore::new(pool.clone())),
            usage: Arc::new(postgres::PgUsageLogStore::new(pool.clone())),
            users: Arc::new(postgres::PgUserStore::new(pool.clone())),
            posts: Arc::new(postgres::PgPostStore::new(pool)),
        }
    }

    /// In-memory stores; state lives for the lifetime of the process
    pub fn in_memory() -> Self {
        Self {
            api_keys: Arc::new(memory::MemoryApiKeyStore::new()),
            usage: Arc::new(memory::MemoryUsageLogStore::new()),
            users: Arc::new(memory::MemoryUserStore::new()),
            posts: Arc::new(memory::MemoryPostStore::new()),
        }
    }
}
