//! Common DTOs shared across multiple resources

use serde::{Deserialize, Serialize};

/// Standard error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

/// Standard success response
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse<T> {
    pub data: T,
}

impl<T> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Pagination parameters
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PaginationParams {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl PaginationParams {
    pub fn validate(&self) -> Result<(), String> {
        if self.limit < 1 || self.limit > 100 {
            return Err("Limit must be between 1 and 100".to_string());
        }
        if self.offset < 0 {
            return Err("Offset must be non-negative".to_string());
        }
        Ok(())
    }
}

/// Paginated response
#[derive(Debug, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

impl PaginationMeta {
    pub fn new(total: i64, limit: i64, offset: i64) -> Self {
        Self {
            total,
            limit,
            offset,
            has_more: offset + limit < total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_serialization() {
        let err = ErrorResponse::new("unauthorized", "Missing API key");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("unauthorized"));
        assert!(json.contains("Missing API key"));
    }

    #[test]
    fn test_pagination_params_validate() {
        assert!(PaginationParams { limit: 20, offset: 0 }.validate().is_ok());
        assert!(PaginationParams { limit: 0, offset: 0 }.validate().is_err());
        assert!(PaginationParams { limit: 101, offset: 0 }.validate().is_err());
        assert!(PaginationParams { limit: 20, offset: -1 }.validate().is_err());
    }

    #[test]
    fn test_pagination_params_default_deserialization() {
        let params: PaginationParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params.limit, 20);
        assert_eq!(params.offset, 0);
    }

    #[test]
    fn test_pagination_meta_has_more() {
        assert!(PaginationMeta::new(100, 20, 0).has_more);
        assert!(!PaginationMeta::new(100, 20, 80).has_more);
        assert!(!PaginationMeta::new(100, 20, 90).has_more);
    }
}
