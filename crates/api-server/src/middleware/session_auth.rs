//! Admin session authentication (JWT)
//!
//! Guards the management API. Expects `Authorization: Bearer <jwt>` signed
//! with the configured secret; on success the decoded [`Claims`] are stored
//! in request extensions for handlers to read via [`get_user_id`].

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error as ActixError, HttpMessage, HttpRequest, HttpResponse,
};
use chrono::{DateTime, Duration, Utc};
use futures_util::future::LocalBoxFuture;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use shared::config::AuthConfig;
use shared::models::User;
use shared::Error;
use std::future::{ready, Ready};
use std::rc::Rc;
use tracing::warn;

use crate::models::{Claims, ErrorResponse};
use crate::AppState;

/// Issue a session token for a freshly authenticated user
pub fn create_token(auth: &AuthConfig, user: &User) -> shared::Result<(String, DateTime<Utc>)> {
    let now = Utc::now();
    let expires_at = now + Duration::hours(auth.jwt_expiration_hours);

    let claims = Claims {
        sub: user.id.to_string(),
        username: user.username.clone(),
        exp: expires_at.timestamp(),
        iat: now.timestamp(),
    };

    let token = jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(auth.jwt_secret.as_bytes()),
    )
    .map_err(|e| Error::internal(format!("Failed to sign session token: {}", e)))?;

    Ok((token, expires_at))
}

/// Decode and verify a session token
pub fn decode_token(auth: &AuthConfig, token: &str) -> shared::Result<Claims> {
    let data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(auth.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| Error::authentication(format!("Invalid session token: {}", e)))?;

    Ok(data.claims)
}

/// Read the authenticated user's ID from request extensions
///
/// Only meaningful behind [`SessionAuth`]; elsewhere it returns an
/// authentication error.
pub fn get_user_id(req: &HttpRequest) -> shared::Result<i64> {
    let claims = req
        .extensions()
        .get::<Claims>()
        .cloned()
        .ok_or_else(|| Error::authentication("Missing session"))?;

    claims
        .sub
        .parse()
        .map_err(|_| Error::authentication("Invalid subject claim"))
}

fn unauthorized(message: &str) -> HttpResponse {
    HttpResponse::Unauthorized().json(ErrorResponse::new("unauthorized", message))
}

/// Middleware factory for JWT session authentication
pub struct SessionAuth;

impl<S, B> Transform<S, ServiceRequest> for SessionAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = ActixError;
    type InitError = ();
    type Transform = SessionAuthMiddleware<S>;
    type Future = Ready<std::result::Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SessionAuthMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct SessionAuthMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for SessionAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = ActixError;
    type Future = LocalBoxFuture<'static, std::result::Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();

        Box::pin(async move {
            let state = match req.app_data::<actix_web::web::Data<AppState>>() {
                Some(state) => state.clone(),
                None => {
                    tracing::error!("Application state not found");
                    return Err(actix_web::error::ErrorInternalServerError(
                        "Server configuration error",
                    ));
                }
            };

            let token = req
                .headers()
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .and_then(|h| h.strip_prefix("Bearer "))
                .map(str::trim);

            let Some(token) = token else {
                let response = unauthorized("Missing or invalid authorization header");
                return Ok(req.into_response(response).map_into_right_body());
            };

            let claims = match decode_token(&state.config.auth, token) {
                Ok(claims) => claims,
                Err(e) => {
                    warn!(path = %req.path(), error = %e, "Rejected session token");
                    let response = unauthorized("Invalid or expired session token");
                    return Ok(req.into_response(response).map_into_right_body());
                }
            };

            req.extensions_mut().insert(claims);
            service.call(req).await.map(|res| res.map_into_left_body())
        })
    }
}
