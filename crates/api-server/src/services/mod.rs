//! Business logic services

pub mod api_key_service;
pub mod secret_hasher;
pub mod usage_logger;

pub use api_key_service::{ApiKeyService, GeneratedKey, KeyRejection, KeyValidation};
pub use secret_hasher::{HasherError, SecretHasher};
pub use usage_logger::UsageLogger;
