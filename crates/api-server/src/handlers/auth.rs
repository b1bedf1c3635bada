//! Admin login handler

use actix_web::{web, HttpResponse};
use tracing::{info, warn};

use crate::handlers::helpers::{unauthorized, validate_request};
use crate::middleware::create_token;
use crate::models::{ErrorResponse, LoginRequest, LoginResponse};
use crate::AppState;

/// POST /api/v1/auth/login
///
/// Exchanges username/password for a session JWT. Unknown usernames burn a
/// dummy Argon2 verification so the response time does not reveal which
/// accounts exist.
pub async fn login(state: web::Data<AppState>, body: web::Json<LoginRequest>) -> HttpResponse {
    if let Err(resp) = validate_request(&*body) {
        return resp;
    }

    let user = match state.stores.users.find_by_username(&body.username).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            state.api_keys.hasher().dummy_verify();
            warn!(username = %body.username, "Login attempt for unknown user");
            return unauthorized("Invalid username or password");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to look up user");
            return HttpResponse::InternalServerError()
                .json(ErrorResponse::new("internal_error", "Failed to log in"));
        }
    };

    match state.api_keys.hasher().verify(&body.password, &user.password_hash) {
        Ok(true) => {}
        Ok(false) => {
            warn!(username = %user.username, "Login attempt with wrong password");
            return unauthorized("Invalid username or password");
        }
        Err(e) => {
            tracing::error!(user_id = user.id, error = %e, "Password verification failed");
            return HttpResponse::InternalServerError()
                .json(ErrorResponse::new("internal_error", "Failed to log in"));
        }
    }

    let (token, expires_at) = match create_token(&state.config.auth, &user) {
        Ok(pair) => pair,
        Err(e) => {
            tracing::error!(user_id = user.id, error = %e, "Failed to issue session token");
            return HttpResponse::InternalServerError()
                .json(ErrorResponse::new("internal_error", "Failed to log in"));
        }
    };

    if let Err(e) = state.stores.users.record_login(user.id, chrono::Utc::now()).await {
        // Not worth failing the login over
        tracing::warn!(user_id = user.id, error = %e, "Failed to record login time");
    }

    info!(user_id = user.id, username = %user.username, "User logged in");
    HttpResponse::Ok().json(LoginResponse { token, expires_at })
}
