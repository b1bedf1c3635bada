//! Workspace-wide error type
//!
//! Every variant corresponds to one HTTP failure class at the API boundary;
//! [`Error::status`] and [`Error::kind`] give the mapping so handlers build
//! uniform error bodies without matching on variants themselves.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// HTTP status this error maps to at the API boundary
    pub fn status(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::Authentication(_) => 401,
            Error::Authorization(_) => 403,
            Error::NotFound { .. } => 404,
            Error::Database(_) | Error::Config(_) | Error::Internal(_) => 500,
        }
    }

    /// Machine-readable label for HTTP error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::Authentication(_) => "unauthorized",
            Error::Authorization(_) => "forbidden",
            Error::NotFound { .. } => "not_found",
            Error::Database(_) | Error::Config(_) | Error::Internal(_) => "internal_error",
        }
    }

    /// Whether the message is safe to echo to the caller
    ///
    /// Server-side failures keep their detail in the logs only.
    pub fn is_client_safe(&self) -> bool {
        self.status() < 500
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::validation("bad").status(), 400);
        assert_eq!(Error::authentication("who").status(), 401);
        assert_eq!(Error::authorization("no").status(), 403);
        assert_eq!(Error::not_found("ApiKey", "7").status(), 404);
        assert_eq!(Error::internal("boom").status(), 500);
    }

    #[test]
    fn test_server_errors_are_not_client_safe() {
        assert!(Error::not_found("User", "1").is_client_safe());
        assert!(!Error::internal("connection reset").is_client_safe());
        assert!(!Error::config("missing DATABASE_URL").is_client_safe());
    }

    #[test]
    fn test_not_found_message_names_entity_and_id() {
        let err = Error::not_found("ApiKey", "42");
        assert_eq!(err.to_string(), "ApiKey not found: 42");
        assert_eq!(err.kind(), "not_found");
    }
}
