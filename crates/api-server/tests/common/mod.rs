//! Common test utilities for integration tests
//!
//! Builds the full application against in-memory backends with a reduced
//! Argon2 cost, so tests exercise the real middleware and handlers without
//! a database or multi-second hashing.

#![allow(dead_code)]

use api_server::repositories::{NewApiKey, NewUser, Stores};
use api_server::services::{ApiKeyService, SecretHasher};
use api_server::AppState;
use chrono::{DateTime, Utc};
use shared::config::{AuthConfig, Config, DatabaseConfig, ServerConfig};
use shared::models::{PermissionSet, User};
use shared::rate_limit::MemoryCounter;
use std::sync::Arc;

pub const TEST_JWT_SECRET: &str = "test_jwt_secret_for_integration_tests_00";
pub const TEST_PASSWORD: &str = "correct-horse-battery-staple";

/// Config with placeholder database settings (in-memory stores ignore them)
pub fn test_config(public_rate_limit: u32) -> Config {
    Config {
        database: DatabaseConfig {
            host: "localhost".to_string(),
            port: 5432,
            name: "unused".to_string(),
            user: "unused".to_string(),
            password: "unused".to_string(),
            max_connections: 1,
            acquire_timeout_secs: 1,
            ssl_mode: "disable".to_string(),
        },
        redis: None,
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            public_rate_limit,
        },
        auth: AuthConfig {
            jwt_secret: TEST_JWT_SECRET.to_string(),
            jwt_expiration_hours: 1,
        },
    }
}

/// Application state over in-memory stores and a fast hasher
pub fn test_state() -> AppState {
    test_state_with_rate_limit(1_000_000)
}

pub fn test_state_with_rate_limit(public_rate_limit: u32) -> AppState {
    let hasher = SecretHasher::with_cost(1024, 1, 1);
    AppState::new(
        test_config(public_rate_limit),
        Stores::in_memory(),
        ApiKeyService::with_hasher(hasher),
        Arc::new(MemoryCounter::new()),
        None,
    )
}

/// Insert a user whose password is [`TEST_PASSWORD`]
pub async fn seed_user(state: &AppState, username: &str, role: &str) -> User {
    let password_hash = state.api_keys.hasher().hash(TEST_PASSWORD).unwrap();
    state
        .stores
        .users
        .insert(NewUser {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password_hash,
            role: role.to_string(),
        })
        .await
        .unwrap()
}

/// Generate and store an API key; returns (plaintext, key_id)
pub async fn seed_key(
    state: &AppState,
    user_id: i64,
    permissions: PermissionSet,
    expires_at: Option<DateTime<Utc>>,
) -> (String, i64) {
    let generated = state.api_keys.generate().unwrap();
    let key = state
        .stores
        .api_keys
        .insert(NewApiKey {
            user_id,
            name: "test-key".to_string(),
            key_hash: generated.hash,
            prefix: generated.prefix,
            permissions,
            expires_at,
        })
        .await
        .unwrap();
    (generated.key, key.id)
}

/// Session token for an existing user
pub fn session_token(state: &AppState, user: &User) -> String {
    let (token, _) = api_server::middleware::create_token(&state.config.auth, user).unwrap();
    token
}

/// Permissions granting post writes but nothing else
pub fn write_posts_only() -> PermissionSet {
    PermissionSet {
        write_posts: true,
        ..PermissionSet::default()
    }
}
