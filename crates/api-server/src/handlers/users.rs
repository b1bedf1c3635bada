//! Public user lookup handler

use actix_web::{web, HttpResponse};

use crate::handlers::helpers::{handle_store_error, require_found};
use crate::models::SuccessResponse;
use crate::AppState;

/// GET /api/public/v1/users/{id}
///
/// Requires `read_users`. The `User` serializer skips the password hash,
/// so the whole record is safe to return.
pub async fn get_user(state: web::Data<AppState>, path: web::Path<i64>) -> HttpResponse {
    let id = path.into_inner();

    let user = match handle_store_error(state.stores.users.find_by_id(id).await, "load user") {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    match require_found(user, "User") {
        Ok(user) => HttpResponse::Ok().json(SuccessResponse::new(user)),
        Err(resp) => resp,
    }
}
