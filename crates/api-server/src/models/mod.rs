//! Request/response DTOs for the API server

pub mod api_keys;
pub mod auth;
pub mod common;
pub mod posts;
pub mod usage;

pub use api_keys::{ApiKeyResponse, CreateApiKeyRequest, CreatedApiKeyResponse, UpdateApiKeyRequest};
pub use auth::{Claims, LoginRequest, LoginResponse};
pub use common::{ErrorResponse, PaginatedResponse, PaginationMeta, PaginationParams, SuccessResponse};
pub use posts::CreatePostRequest;
pub use usage::{EndpointCount, UsageQueryParams, UsageStatsResponse};
