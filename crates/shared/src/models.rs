//! Data models matching the PostgreSQL database schema

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Named capability a route can require from an API key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ReadPosts,
    WritePosts,
    ReadUsers,
    WriteUsers,
    Admin,
}

impl Permission {
    /// Get the permission name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ReadPosts => "read_posts",
            Permission::WritePosts => "write_posts",
            Permission::ReadUsers => "read_users",
            Permission::WriteUsers => "write_users",
            Permission::Admin => "admin",
        }
    }
}

/// Closed set of capabilities granted to an API key
///
/// Stored as JSONB. The vocabulary is fixed so required-permission checks
/// are exhaustive; unknown fields in stored JSON are ignored on read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    #[serde(default)]
    pub read_posts: bool,
    #[serde(default)]
    pub write_posts: bool,
    #[serde(default)]
    pub read_users: bool,
    #[serde(default)]
    pub write_users: bool,
    #[serde(default)]
    pub admin: bool,
}

impl PermissionSet {
    /// Default grant for newly created keys: read-only post access
    pub fn read_only() -> Self {
        Self {
            read_posts: true,
            ..Self::default()
        }
    }

    /// Check a single capability. The admin flag grants everything.
    pub fn allows(&self, permission: Permission) -> bool {
        if self.admin {
            return true;
        }
        match permission {
            Permission::ReadPosts => self.read_posts,
            Permission::WritePosts => self.write_posts,
            Permission::ReadUsers => self.read_users,
            Permission::WriteUsers => self.write_users,
            Permission::Admin => self.admin,
        }
    }

    /// Check that every required capability is granted
    pub fn allows_all(&self, required: &[Permission]) -> bool {
        required.iter().all(|p| self.allows(*p))
    }
}

/// User account
///
/// The `role` field ("admin" or "user") drives the admin bypass path in the
/// API key middleware and management handlers.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// API key credential record
///
/// Note: key_hash is intentionally excluded from serialization for security.
/// The plaintext key exists only at creation time; only the Argon2id hash
/// and the 8-character hex prefix persist.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ApiKey {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub prefix: String,
    #[sqlx(json)]
    pub permissions: PermissionSet,
    pub enabled: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApiKey {
    /// Check whether the key's expiry is set and in the past
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|expires_at| Utc::now() > expires_at)
            .unwrap_or(false)
    }
}

/// One authenticated public-API call, keyed to the API key that made it
///
/// Append-only; never mutated or deleted by normal operation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ApiUsageLog {
    pub id: i64,
    pub api_key_id: i64,
    pub endpoint: String,
    pub method: String,
    pub status_code: i32,
    pub response_time_ms: i32,
    pub request_ip: String,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Blog post
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Post {
    pub id: i64,
    pub author_id: i64,
    pub slug: String,
    pub title: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn key_with_expiry(expires_at: Option<DateTime<Utc>>) -> ApiKey {
        ApiKey {
            id: 1,
            user_id: 1,
            name: "test".to_string(),
            key_hash: "$argon2id$...".to_string(),
            prefix: "deadbeef".to_string(),
            permissions: PermissionSet::read_only(),
            enabled: true,
            last_used_at: None,
            expires_at,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_read_only_default_grant() {
        let perms = PermissionSet::read_only();
        assert!(perms.allows(Permission::ReadPosts));
        assert!(!perms.allows(Permission::WritePosts));
        assert!(!perms.allows(Permission::ReadUsers));
        assert!(!perms.allows(Permission::WriteUsers));
        assert!(!perms.allows(Permission::Admin));
    }

    #[test]
    fn test_admin_flag_grants_everything() {
        let perms = PermissionSet {
            admin: true,
            ..PermissionSet::default()
        };
        assert!(perms.allows(Permission::ReadPosts));
        assert!(perms.allows(Permission::WritePosts));
        assert!(perms.allows(Permission::ReadUsers));
        assert!(perms.allows(Permission::WriteUsers));
        assert!(perms.allows_all(&[Permission::ReadPosts, Permission::WriteUsers]));
    }

    #[test]
    fn test_allows_all_requires_every_permission() {
        let perms = PermissionSet {
            read_posts: true,
            write_posts: true,
            ..PermissionSet::default()
        };
        assert!(perms.allows_all(&[Permission::ReadPosts, Permission::WritePosts]));
        assert!(!perms.allows_all(&[Permission::ReadPosts, Permission::ReadUsers]));
        assert!(perms.allows_all(&[]));
    }

    #[test]
    fn test_permission_set_json_round_trip() {
        let perms = PermissionSet {
            read_posts: true,
            write_users: true,
            ..PermissionSet::default()
        };
        let json = serde_json::to_string(&perms).unwrap();
        let parsed: PermissionSet = serde_json::from_str(&json).unwrap();
        assert_eq!(perms, parsed);
    }

    #[test]
    fn test_permission_set_missing_fields_default_false() {
        // Rows written before a capability was added deserialize cleanly
        let parsed: PermissionSet = serde_json::from_str(r#"{"read_posts": true}"#).unwrap();
        assert!(parsed.read_posts);
        assert!(!parsed.admin);
    }

    #[test]
    fn test_api_key_expiry() {
        assert!(!key_with_expiry(None).is_expired());
        assert!(!key_with_expiry(Some(Utc::now() + Duration::hours(1))).is_expired());
        assert!(key_with_expiry(Some(Utc::now() - Duration::hours(1))).is_expired());
    }

    #[test]
    fn test_api_key_serialization_excludes_hash() {
        let key = key_with_expiry(None);
        let json = serde_json::to_string(&key).unwrap();
        assert!(!json.contains("key_hash"));
        assert!(!json.contains("argon2id"));
        assert!(json.contains("\"prefix\":\"deadbeef\""));
    }

    #[test]
    fn test_user_serialization_excludes_password_hash() {
        let user = User {
            id: 1,
            username: "dan".to_string(),
            email: "dan@example.com".to_string(),
            password_hash: "$argon2id$...".to_string(),
            role: "admin".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_login_at: None,
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(user.is_admin());
    }
}
