//! CORS configuration
//!
//! Origins come from `CORS_ALLOWED_ORIGINS` (comma-separated). Production
//! (`APP_ENV=production`) accepts HTTPS origins only and has no default
//! whitelist; development falls back to localhost origins.

use actix_cors::Cors;
use actix_web::http::header;
use std::env;
use tracing::{debug, warn};

/// Build the CORS middleware from environment configuration
pub fn cors() -> Cors {
    let production = env::var("APP_ENV")
        .map(|e| e == "production")
        .unwrap_or(false);

    let allowed = env::var("CORS_ALLOWED_ORIGINS").unwrap_or_else(|_| {
        if production {
            warn!("CORS_ALLOWED_ORIGINS not set in production; cross-origin requests disabled");
            String::new()
        } else {
            "http://localhost:3000,http://localhost:8080".to_string()
        }
    });

    let origins: Vec<String> = allowed
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .filter(|origin| {
            if origin == "*" {
                warn!("Wildcard CORS origin rejected; list origins explicitly");
                return false;
            }
            if production && !origin.starts_with("https://") {
                warn!(origin = %origin, "Rejecting non-HTTPS origin in production");
                return false;
            }
            if !origin.starts_with("http://") && !origin.starts_with("https://") {
                warn!(origin = %origin, "Invalid origin format");
                return false;
            }
            true
        })
        .collect();

    let mut cors = Cors::default();
    for origin in &origins {
        cors = cors.allowed_origin(origin);
    }
    debug!(origins = origins.len(), "CORS middleware initialized");

    cors.allowed_methods(vec!["GET", "POST", "PATCH", "DELETE", "OPTIONS"])
        .allowed_headers(vec![
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ])
        .max_age(3600)
}
