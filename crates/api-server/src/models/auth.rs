//! Admin session authentication DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// JWT claims for an admin session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID (stringified i64)
    pub sub: String,

    /// Username at the time of login
    pub username: String,

    /// Expiry (unix timestamp)
    pub exp: i64,

    /// Issued at (unix timestamp)
    pub iat: i64,
}

/// Request body for POST /auth/login
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 100, message = "Username is required"))]
    pub username: String,

    #[validate(length(min = 1, max = 200, message = "Password is required"))]
    pub password: String,
}

/// Successful login response
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}
