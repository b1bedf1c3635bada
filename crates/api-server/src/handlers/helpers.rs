//! Common handler helpers
//!
//! Small adapters that keep the handlers' match arms short: validation,
//! not-found conversion, and uniform error bodies built from
//! [`shared::Error`]'s status/kind mapping.

use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse};
use shared::Error;
use validator::Validate;

use crate::middleware::get_user_id;
use crate::models::ErrorResponse;

/// Build the HTTP response for an application error
///
/// Client errors echo their message; server errors keep the detail in the
/// logs and answer with a generic body.
pub fn error_response(err: &Error) -> HttpResponse {
    let status =
        StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let message = if err.is_client_safe() {
        err.to_string()
    } else {
        "Internal server error".to_string()
    };
    HttpResponse::build(status).json(ErrorResponse::new(err.kind(), message))
}

/// Extract user_id from session claims or return 401 Unauthorized
pub fn extract_user_id_or_unauthorized(req: &HttpRequest) -> Result<i64, HttpResponse> {
    get_user_id(req).map_err(|_| {
        error_response(&Error::authentication("Authentication required"))
    })
}

/// Validate a request struct or return 400 Bad Request
pub fn validate_request<T: Validate>(req: &T) -> Result<(), HttpResponse> {
    req.validate()
        .map_err(|e| error_response(&Error::validation(format!("Validation failed: {}", e))))
}

/// Handle storage errors with consistent logging and a safe 500 response
pub fn handle_store_error<T>(result: shared::Result<T>, context: &str) -> Result<T, HttpResponse> {
    result.map_err(|e| {
        tracing::error!("Storage error during {}: {}", context, e);
        error_response(&Error::internal(format!("Failed to {}", context)))
    })
}

/// Convert Option<T> to T or return 404 Not Found
pub fn require_found<T>(option: Option<T>, resource: &str) -> Result<T, HttpResponse> {
    option.ok_or_else(|| {
        HttpResponse::NotFound().json(ErrorResponse::new(
            "not_found",
            format!("{} not found", resource),
        ))
    })
}

/// Return a 400 Bad Request response with a custom message
pub fn bad_request(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse::new("bad_request", message))
}

/// Return a 401 Unauthorized response with a custom message
pub fn unauthorized(message: &str) -> HttpResponse {
    HttpResponse::Unauthorized().json(ErrorResponse::new("unauthorized", message))
}

/// Return a 409 Conflict response with a custom message
pub fn conflict(message: &str) -> HttpResponse {
    HttpResponse::Conflict().json(ErrorResponse::new("conflict", message))
}
