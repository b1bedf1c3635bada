//! Health check endpoint

use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::AppState;

/// GET /api/v1/health
///
/// Reports process liveness and, when a database pool is attached, whether
/// the database answers a trivial query.
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let database = match &state.db {
        Some(pool) => match shared::db::check_health(pool).await {
            Ok(()) => "ok",
            Err(e) => {
                tracing::error!(error = %e, "Database health check failed");
                return HttpResponse::ServiceUnavailable().json(json!({
                    "status": "degraded",
                    "database": "unreachable",
                }));
            }
        },
        None => "in_memory",
    };

    HttpResponse::Ok().json(json!({
        "status": "ok",
        "database": database,
    }))
}
