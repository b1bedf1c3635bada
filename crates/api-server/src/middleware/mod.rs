//! HTTP middleware

pub mod api_key_auth;
pub mod cors;
pub mod ip_extractor;
pub mod rate_limit;
pub mod session_auth;

pub use api_key_auth::{ApiKeyAuth, AuthedKey};
pub use cors::cors;
pub use rate_limit::IpRateLimit;
pub use session_auth::{create_token, decode_token, get_user_id, SessionAuth};
