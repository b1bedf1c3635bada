//! API key management DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use shared::models::{ApiKey, PermissionSet};
use validator::Validate;

/// Request body for creating an API key
#[derive(Debug, Deserialize, Validate)]
pub struct CreateApiKeyRequest {
    /// Human-readable label for the key
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    /// Capabilities granted to the key; defaults to read-only post access
    pub permissions: Option<PermissionSet>,

    /// Optional expiry timestamp
    pub expires_at: Option<DateTime<Utc>>,

    /// Mint the key for another account; admin callers only
    pub user_id: Option<i64>,
}

/// Request body for updating an API key
///
/// `expires_at` distinguishes "not sent" (field absent, leave unchanged) from
/// "sent as null" (clear the expiry). The double Option plus the custom
/// deserializer preserves that distinction.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateApiKeyRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,

    pub permissions: Option<PermissionSet>,

    pub enabled: Option<bool>,

    #[serde(default, deserialize_with = "double_option")]
    pub expires_at: Option<Option<DateTime<Utc>>>,
}

fn double_option<'de, D>(de: D) -> Result<Option<Option<DateTime<Utc>>>, D::Error>
where
    D: Deserializer<'de>,
{
    Deserialize::deserialize(de).map(Some)
}

/// API key metadata returned by management endpoints
///
/// Never includes the stored hash; the prefix is the only key-derived field
/// that survives creation.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiKeyResponse {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub prefix: String,
    pub permissions: PermissionSet,
    pub enabled: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ApiKey> for ApiKeyResponse {
    fn from(key: ApiKey) -> Self {
        Self {
            id: key.id,
            user_id: key.user_id,
            name: key.name,
            prefix: key.prefix,
            permissions: key.permissions,
            enabled: key.enabled,
            last_used_at: key.last_used_at,
            expires_at: key.expires_at,
            created_at: key.created_at,
            updated_at: key.updated_at,
        }
    }
}

/// Response for key creation: the only time the plaintext key is ever shown
#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedApiKeyResponse {
    pub message: String,

    /// Sanitized key metadata (no hash)
    pub api_key: ApiKeyResponse,

    /// Full plaintext key. Shown once; only the hash is stored.
    pub key: String,
}
