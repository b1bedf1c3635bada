//! Postgres-backed store implementations
//!
//! All key material is persisted as Argon2id hashes; plaintext keys never
//! reach this module. Usage logs are append-only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::models::{ApiKey, ApiUsageLog, Post, User};
use shared::{DbPool, Error, Result};

use super::{
    ApiKeyChanges, ApiKeyStore, NewApiKey, NewPost, NewUsageLog, NewUser, PostStore, UsageLogStore,
    UsageStats, UsageWindow, UserStore,
};

// ============================================================================
// API keys
// ============================================================================

pub struct PgApiKeyStore {
    pool: DbPool,
}

impl PgApiKeyStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApiKeyStore for PgApiKeyStore {
    async fn insert(&self, new: NewApiKey) -> Result<ApiKey> {
        let permissions = serde_json::to_value(new.permissions)
            .map_err(|e| Error::internal(format!("Failed to serialize permissions: {}", e)))?;

        let key = sqlx::query_as::<_, ApiKey>(
            r#"
            INSERT INTO api_keys (user_id, name, key_hash, prefix, permissions, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(new.user_id)
        .bind(&new.name)
        .bind(&new.key_hash)
        .bind(&new.prefix)
        .bind(&permissions)
        .bind(new.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(key)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<ApiKey>> {
        let key = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(key)
    }

    async fn find_enabled_by_prefix(&self, prefix: &str) -> Result<Vec<ApiKey>> {
        let keys = sqlx::query_as::<_, ApiKey>(
            "SELECT * FROM api_keys WHERE prefix = $1 AND enabled = TRUE",
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<ApiKey>> {
        let keys = sqlx::query_as::<_, ApiKey>(
            "SELECT * FROM api_keys WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }

    async fn list_all(&self) -> Result<Vec<ApiKey>> {
        let keys = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;

        Ok(keys)
    }

    async fn update(&self, id: i64, changes: ApiKeyChanges) -> Result<Option<ApiKey>> {
        let permissions = match changes.permissions {
            Some(p) => Some(
                serde_json::to_value(p).map_err(|e| {
                    Error::internal(format!("Failed to serialize permissions: {}", e))
                })?,
            ),
            None => None,
        };

        // expires_at supports an explicit NULL, so it cannot use COALESCE
        let set_expiry = changes.expires_at.is_some();
        let expires_at = changes.expires_at.flatten();

        let key = sqlx::query_as::<_, ApiKey>(
            r#"
            UPDATE api_keys SET
                name = COALESCE($2, name),
                permissions = COALESCE($3, permissions),
                enabled = COALESCE($4, enabled),
                expires_at = CASE WHEN $5 THEN $6 ELSE expires_at END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(changes.name)
        .bind(permissions)
        .bind(changes.enabled)
        .bind(set_expiry)
        .bind(expires_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(key)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM api_keys WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn touch_last_used(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

// ============================================================================
// Usage logs
// ============================================================================

pub struct PgUsageLogStore {
    pool: DbPool,
}

impl PgUsageLogStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageLogStore for PgUsageLogStore {
    async fn insert(&self, log: NewUsageLog) -> Result<ApiUsageLog> {
        let row = sqlx::query_as::<_, ApiUsageLog>(
            r#"
            INSERT INTO api_usage_logs (
                api_key_id, endpoint, method, status_code,
                response_time_ms, request_ip, user_agent
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(log.api_key_id)
        .bind(&log.endpoint)
        .bind(&log.method)
        .bind(log.status_code)
        .bind(log.response_time_ms)
        .bind(&log.request_ip)
        .bind(&log.user_agent)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn list_for_key(
        &self,
        api_key_id: i64,
        window: UsageWindow,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ApiUsageLog>> {
        let rows = sqlx::query_as::<_, ApiUsageLog>(
            r#"
            SELECT * FROM api_usage_logs
            WHERE api_key_id = $1
              AND ($2::timestamptz IS NULL OR created_at >= $2)
              AND ($3::timestamptz IS NULL OR created_at < $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(api_key_id)
        .bind(window.from)
        .bind(window.to)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn count_for_key(&self, api_key_id: i64, window: UsageWindow) -> Result<i64> {
        let (count,) = sqlx::query_as::<_, (i64,)>(
            r#"
            SELECT COUNT(*) FROM api_usage_logs
            WHERE api_key_id = $1
              AND ($2::timestamptz IS NULL OR created_at >= $2)
              AND ($3::timestamptz IS NULL OR created_at < $3)
            "#,
        )
        .bind(api_key_id)
        .bind(window.from)
        .bind(window.to)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn stats_for_key(&self, api_key_id: i64, window: UsageWindow) -> Result<UsageStats> {
        let (total, errors, avg_ms) = sqlx::query_as::<_, (i64, i64, f64)>(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE status_code >= 400),
                COALESCE(AVG(response_time_ms), 0)::float8
            FROM api_usage_logs
            WHERE api_key_id = $1
              AND ($2::timestamptz IS NULL OR created_at >= $2)
              AND ($3::timestamptz IS NULL OR created_at < $3)
            "#,
        )
        .bind(api_key_id)
        .bind(window.from)
        .bind(window.to)
        .fetch_one(&self.pool)
        .await?;

        let by_endpoint = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT endpoint, COUNT(*) AS count
            FROM api_usage_logs
            WHERE api_key_id = $1
              AND ($2::timestamptz IS NULL OR created_at >= $2)
              AND ($3::timestamptz IS NULL OR created_at < $3)
            GROUP BY endpoint
            ORDER BY count DESC
            "#,
        )
        .bind(api_key_id)
        .bind(window.from)
        .bind(window.to)
        .fetch_all(&self.pool)
        .await?;

        Ok(UsageStats {
            total_requests: total,
            error_requests: errors,
            avg_response_time_ms: avg_ms,
            requests_by_endpoint: by_endpoint,
        })
    }
}

// ============================================================================
// Users
// ============================================================================

pub struct PgUserStore {
    pool: DbPool,
}

impl PgUserStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, new: NewUser) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash, role)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(&new.role)
        .fetch_one(&self.pool)
        .await
        .map_err(unique_violation_to_validation("Username or email already taken"))?;

        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn record_login(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE users SET last_login_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

// ============================================================================
// Posts
// ============================================================================

pub struct PgPostStore {
    pool: DbPool,
}

impl PgPostStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn insert(&self, new: NewPost) -> Result<Post> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts (author_id, slug, title, excerpt, content, published)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(new.author_id)
        .bind(&new.slug)
        .bind(&new.title)
        .bind(&new.excerpt)
        .bind(&new.content)
        .bind(new.published)
        .fetch_one(&self.pool)
        .await
        .map_err(unique_violation_to_validation(
            "A post with this slug already exists",
        ))?;

        Ok(post)
    }

    async fn find_published_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(
            "SELECT * FROM posts WHERE slug = $1 AND published = TRUE",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        Ok(post)
    }

    async fn list_published(&self, limit: i64, offset: i64) -> Result<Vec<Post>> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT * FROM posts
            WHERE published = TRUE
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(posts)
    }

    async fn count_published(&self) -> Result<i64> {
        let (count,) =
            sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM posts WHERE published = TRUE")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}

/// Map a unique-constraint violation to a validation error with `message`
fn unique_violation_to_validation(message: &'static str) -> impl Fn(sqlx::Error) -> Error {
    move |e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => Error::validation(message),
        _ => Error::from(e),
    }
}
