//! In-memory store implementations
//!
//! Backing storage for tests and single-instance demo deployments. State is
//! process-local and lost on restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::models::{ApiKey, ApiUsageLog, Post, User};
use shared::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

use super::{
    ApiKeyChanges, ApiKeyStore, NewApiKey, NewPost, NewUsageLog, NewUser, PostStore, UsageLogStore,
    UsageStats, UsageWindow, UserStore,
};

fn next_id(counter: &AtomicI64) -> i64 {
    counter.fetch_add(1, Ordering::SeqCst)
}

// ============================================================================
// API keys
// ============================================================================

pub struct MemoryApiKeyStore {
    keys: RwLock<HashMap<i64, ApiKey>>,
    next_id: AtomicI64,
}

impl MemoryApiKeyStore {
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for MemoryApiKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ApiKeyStore for MemoryApiKeyStore {
    async fn insert(&self, new: NewApiKey) -> Result<ApiKey> {
        let now = Utc::now();
        let key = ApiKey {
            id: next_id(&self.next_id),
            user_id: new.user_id,
            name: new.name,
            key_hash: new.key_hash,
            prefix: new.prefix,
            permissions: new.permissions,
            enabled: true,
            last_used_at: None,
            expires_at: new.expires_at,
            created_at: now,
            updated_at: now,
        };

        self.keys.write().await.insert(key.id, key.clone());
        Ok(key)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<ApiKey>> {
        Ok(self.keys.read().await.get(&id).cloned())
    }

    async fn find_enabled_by_prefix(&self, prefix: &str) -> Result<Vec<ApiKey>> {
        Ok(self
            .keys
            .read()
            .await
            .values()
            .filter(|k| k.enabled && k.prefix == prefix)
            .cloned()
            .collect())
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<ApiKey>> {
        let mut keys: Vec<ApiKey> = self
            .keys
            .read()
            .await
            .values()
            .filter(|k| k.user_id == user_id)
            .cloned()
            .collect();
        keys.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(keys)
    }

    async fn list_all(&self) -> Result<Vec<ApiKey>> {
        let mut keys: Vec<ApiKey> = self.keys.read().await.values().cloned().collect();
        keys.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(keys)
    }

    async fn update(&self, id: i64, changes: ApiKeyChanges) -> Result<Option<ApiKey>> {
        let mut keys = self.keys.write().await;
        let Some(key) = keys.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(name) = changes.name {
            key.name = name;
        }
        if let Some(permissions) = changes.permissions {
            key.permissions = permissions;
        }
        if let Some(enabled) = changes.enabled {
            key.enabled = enabled;
        }
        if let Some(expires_at) = changes.expires_at {
            key.expires_at = expires_at;
        }
        key.updated_at = Utc::now();

        Ok(Some(key.clone()))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        Ok(self.keys.write().await.remove(&id).is_some())
    }

    async fn touch_last_used(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        if let Some(key) = self.keys.write().await.get_mut(&id) {
            key.last_used_at = Some(at);
        }
        Ok(())
    }
}

// ============================================================================
// Usage logs
// ============================================================================

pub struct MemoryUsageLogStore {
    logs: RwLock<Vec<ApiUsageLog>>,
    next_id: AtomicI64,
}

impl MemoryUsageLogStore {
    pub fn new() -> Self {
        Self {
            logs: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for MemoryUsageLogStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UsageLogStore for MemoryUsageLogStore {
    async fn insert(&self, log: NewUsageLog) -> Result<ApiUsageLog> {
        let row = ApiUsageLog {
            id: next_id(&self.next_id),
            api_key_id: log.api_key_id,
            endpoint: log.endpoint,
            method: log.method,
            status_code: log.status_code,
            response_time_ms: log.response_time_ms,
            request_ip: log.request_ip,
            user_agent: log.user_agent,
            created_at: Utc::now(),
        };

        self.logs.write().await.push(row.clone());
        Ok(row)
    }

    async fn list_for_key(
        &self,
        api_key_id: i64,
        window: UsageWindow,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ApiUsageLog>> {
        let logs = self.logs.read().await;
        let mut rows: Vec<ApiUsageLog> = logs
            .iter()
            .filter(|l| l.api_key_id == api_key_id && window.contains(l.created_at))
            .cloned()
            .collect();
        rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

        Ok(rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_for_key(&self, api_key_id: i64, window: UsageWindow) -> Result<i64> {
        let logs = self.logs.read().await;
        Ok(logs
            .iter()
            .filter(|l| l.api_key_id == api_key_id && window.contains(l.created_at))
            .count() as i64)
    }

    async fn stats_for_key(&self, api_key_id: i64, window: UsageWindow) -> Result<UsageStats> {
        let logs = self.logs.read().await;
        let rows: Vec<&ApiUsageLog> = logs
            .iter()
            .filter(|l| l.api_key_id == api_key_id && window.contains(l.created_at))
            .collect();

        let total = rows.len() as i64;
        let errors = rows.iter().filter(|l| l.status_code >= 400).count() as i64;
        let avg_ms = if rows.is_empty() {
            0.0
        } else {
            rows.iter().map(|l| l.response_time_ms as f64).sum::<f64>() / rows.len() as f64
        };

        let mut counts: HashMap<String, i64> = HashMap::new();
        for row in &rows {
            *counts.entry(row.endpoint.clone()).or_insert(0) += 1;
        }
        let mut by_endpoint: Vec<(String, i64)> = counts.into_iter().collect();
        by_endpoint.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

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

pub struct MemoryUserStore {
    users: RwLock<HashMap<i64, User>>,
    next_id: AtomicI64,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, new: NewUser) -> Result<User> {
        let mut users = self.users.write().await;

        let taken = users
            .values()
            .any(|u| u.username == new.username || u.email == new.email);
        if taken {
            return Err(Error::validation("Username or email already taken"));
        }

        let now = Utc::now();
        let user = User {
            id: next_id(&self.next_id),
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            role: new.role,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        };

        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn record_login(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        if let Some(user) = self.users.write().await.get_mut(&id) {
            user.last_login_at = Some(at);
        }
        Ok(())
    }
}

// ============================================================================
// Posts
// ============================================================================

pub struct MemoryPostStore {
    posts: RwLock<HashMap<i64, Post>>,
    next_id: AtomicI64,
}

impl MemoryPostStore {
    pub fn new() -> Self {
        Self {
            posts: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for MemoryPostStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PostStore for MemoryPostStore {
    async fn insert(&self, new: NewPost) -> Result<Post> {
        let mut posts = self.posts.write().await;

        if posts.values().any(|p| p.slug == new.slug) {
            return Err(Error::validation("A post with this slug already exists"));
        }

        let now = Utc::now();
        let post = Post {
            id: next_id(&self.next_id),
            author_id: new.author_id,
            slug: new.slug,
            title: new.title,
            excerpt: new.excerpt,
            content: new.content,
            published: new.published,
            created_at: now,
            updated_at: now,
        };

        posts.insert(post.id, post.clone());
        Ok(post)
    }

    async fn find_published_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        Ok(self
            .posts
            .read()
            .await
            .values()
            .find(|p| p.published && p.slug == slug)
            .cloned())
    }

    async fn list_published(&self, limit: i64, offset: i64) -> Result<Vec<Post>> {
        let mut posts: Vec<Post> = self
            .posts
            .read()
            .await
            .values()
            .filter(|p| p.published)
            .cloned()
            .collect();
        posts.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

        Ok(posts
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_published(&self) -> Result<i64> {
        Ok(self.posts.read().await.values().filter(|p| p.published).count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::PermissionSet;

    fn new_key(user_id: i64, prefix: &str) -> NewApiKey {
        NewApiKey {
            user_id,
            name: "test".to_string(),
            key_hash: "$argon2id$...".to_string(),
            prefix: prefix.to_string(),
            permissions: PermissionSet::read_only(),
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn test_api_key_insert_and_find() {
        let store = MemoryApiKeyStore::new();
        let key = store.insert(new_key(1, "deadbeef")).await.unwrap();

        assert!(key.enabled);
        let found = store.find_by_id(key.id).await.unwrap().unwrap();
        assert_eq!(found.prefix, "deadbeef");
    }

    #[tokio::test]
    async fn test_find_enabled_by_prefix_excludes_disabled() {
        let store = MemoryApiKeyStore::new();
        let key = store.insert(new_key(1, "deadbeef")).await.unwrap();
        store.insert(new_key(1, "cafebabe")).await.unwrap();

        assert_eq!(store.find_enabled_by_prefix("deadbeef").await.unwrap().len(), 1);

        store
            .update(
                key.id,
                ApiKeyChanges {
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(store.find_enabled_by_prefix("deadbeef").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_find_enabled_by_prefix_returns_all_collisions() {
        let store = MemoryApiKeyStore::new();
        store.insert(new_key(1, "deadbeef")).await.unwrap();
        store.insert(new_key(2, "deadbeef")).await.unwrap();

        assert_eq!(store.find_enabled_by_prefix("deadbeef").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_clears_expiry() {
        let store = MemoryApiKeyStore::new();
        let mut new = new_key(1, "deadbeef");
        new.expires_at = Some(Utc::now());
        let key = store.insert(new).await.unwrap();

        let updated = store
            .update(
                key.id,
                ApiKeyChanges {
                    expires_at: Some(None),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert!(updated.expires_at.is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryApiKeyStore::new();
        let key = store.insert(new_key(1, "deadbeef")).await.unwrap();

        assert!(store.delete(key.id).await.unwrap());
        assert!(!store.delete(key.id).await.unwrap());
        assert!(store.find_by_id(key.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_touch_last_used() {
        let store = MemoryApiKeyStore::new();
        let key = store.insert(new_key(1, "deadbeef")).await.unwrap();

        let at = Utc::now();
        store.touch_last_used(key.id, at).await.unwrap();

        let found = store.find_by_id(key.id).await.unwrap().unwrap();
        assert_eq!(found.last_used_at, Some(at));
    }

    fn usage(api_key_id: i64, endpoint: &str, status: i32, ms: i32) -> NewUsageLog {
        NewUsageLog {
            api_key_id,
            endpoint: endpoint.to_string(),
            method: "GET".to_string(),
            status_code: status,
            response_time_ms: ms,
            request_ip: "10.0.0.1".to_string(),
            user_agent: None,
        }
    }

    #[tokio::test]
    async fn test_usage_stats() {
        let store = MemoryUsageLogStore::new();
        store.insert(usage(1, "/posts", 200, 10)).await.unwrap();
        store.insert(usage(1, "/posts", 200, 30)).await.unwrap();
        store.insert(usage(1, "/users/1", 403, 20)).await.unwrap();
        store.insert(usage(2, "/posts", 200, 5)).await.unwrap();

        let stats = store.stats_for_key(1, UsageWindow::default()).await.unwrap();
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.error_requests, 1);
        assert!((stats.avg_response_time_ms - 20.0).abs() < f64::EPSILON);
        assert_eq!(stats.requests_by_endpoint[0], ("/posts".to_string(), 2));
    }

    #[tokio::test]
    async fn test_usage_stats_empty_window() {
        let store = MemoryUsageLogStore::new();
        let stats = store.stats_for_key(1, UsageWindow::default()).await.unwrap();
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.error_requests, 0);
        assert_eq!(stats.avg_response_time_ms, 0.0);
        assert!(stats.requests_by_endpoint.is_empty());
    }

    #[tokio::test]
    async fn test_usage_window_filters() {
        let store = MemoryUsageLogStore::new();
        store.insert(usage(1, "/posts", 200, 10)).await.unwrap();

        let past = UsageWindow {
            from: None,
            to: Some(Utc::now() - chrono::Duration::hours(1)),
        };
        assert_eq!(store.count_for_key(1, past).await.unwrap(), 0);
        assert_eq!(store.count_for_key(1, UsageWindow::default()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_user_unique_username() {
        let store = MemoryUserStore::new();
        let new = NewUser {
            username: "dan".to_string(),
            email: "dan@example.com".to_string(),
            password_hash: "$argon2id$...".to_string(),
            role: "admin".to_string(),
        };

        store.insert(new.clone()).await.unwrap();
        assert!(store.insert(new).await.is_err());
    }

    #[tokio::test]
    async fn test_post_slug_unique_and_published_filter() {
        let store = MemoryPostStore::new();
        let new = NewPost {
            author_id: 1,
            slug: "hello".to_string(),
            title: "Hello".to_string(),
            excerpt: None,
            content: "Body".to_string(),
            published: true,
        };

        store.insert(new.clone()).await.unwrap();
        assert!(store.insert(new.clone()).await.is_err());

        let mut draft = new;
        draft.slug = "draft".to_string();
        draft.published = false;
        store.insert(draft).await.unwrap();

        assert_eq!(store.count_published().await.unwrap(), 1);
        assert!(store.find_published_by_slug("draft").await.unwrap().is_none());
    }
}
