//! API key authentication and permission enforcement
//!
//! Guards the public API. Each wrapped route declares the permissions it
//! requires; the middleware pulls the key from `Authorization: Bearer`,
//! validates it, enforces the grant, and records a usage row for every
//! authenticated request.
//!
//! # Response policy
//!
//! - Missing header, wrong scheme, malformed, unknown, disabled, or expired
//!   keys → 401 with a generic body. The rejection reason is logged
//!   server-side only, so responses do not reveal which prefixes or keys
//!   exist.
//! - A valid key lacking a required permission → 403, unless the key carries
//!   the admin override or the owning account's role is admin. The key is
//!   known at that point, so the denial IS recorded in the usage log.
//! - Authenticated requests get a usage row regardless of handler outcome;
//!   `last_used_at` is updated off the request path as soon as validation
//!   succeeds.

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error as ActixError, HttpMessage, HttpResponse,
};
use futures_util::future::LocalBoxFuture;
use shared::models::{Permission, PermissionSet};
use std::future::{ready, Ready};
use std::rc::Rc;
use std::time::Instant;
use tracing::{error, warn};

use crate::middleware::ip_extractor;
use crate::models::ErrorResponse;
use crate::repositories::NewUsageLog;
use crate::services::KeyValidation;
use crate::AppState;

/// Identity of the validated key, stored in request extensions
#[derive(Debug, Clone)]
pub struct AuthedKey {
    pub key_id: i64,
    pub user_id: i64,
    pub permissions: PermissionSet,
}

fn unauthorized() -> HttpResponse {
    HttpResponse::Unauthorized().json(ErrorResponse::new(
        "unauthorized",
        "Missing or invalid authorization header",
    ))
}

fn forbidden() -> HttpResponse {
    HttpResponse::Forbidden().json(ErrorResponse::new(
        "forbidden",
        "API key lacks the required permissions",
    ))
}

/// Middleware factory enforcing API key authentication for a route
pub struct ApiKeyAuth {
    required: Rc<Vec<Permission>>,
}

impl ApiKeyAuth {
    /// Require the given permissions on every request through this route
    pub fn require(required: &[Permission]) -> Self {
        Self {
            required: Rc::new(required.to_vec()),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for ApiKeyAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = ActixError;
    type InitError = ();
    type Transform = ApiKeyAuthMiddleware<S>;
    type Future = Ready<std::result::Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ApiKeyAuthMiddleware {
            service: Rc::new(service),
            required: self.required.clone(),
        }))
    }
}

pub struct ApiKeyAuthMiddleware<S> {
    service: Rc<S>,
    required: Rc<Vec<Permission>>,
}

impl<S, B> Service<ServiceRequest> for ApiKeyAuthMiddleware<S>
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
        let required = self.required.clone();

        Box::pin(async move {
            let started = Instant::now();

            let state = match req.app_data::<actix_web::web::Data<AppState>>() {
                Some(state) => state.clone(),
                None => {
                    error!("Application state not found");
                    return Err(actix_web::error::ErrorInternalServerError(
                        "Server configuration error",
                    ));
                }
            };

            // Request metadata, captured before the request is consumed
            let endpoint = req.path().to_string();
            let method = req.method().to_string();
            let request_ip = ip_extractor::extract_ip(req.request());
            let user_agent = req
                .headers()
                .get("user-agent")
                .and_then(|h| h.to_str().ok())
                .map(|s| s.to_string());

            // The key rides the Bearer scheme; any other scheme is rejected
            // before the validator sees it
            let raw_key = req
                .headers()
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .and_then(|h| h.strip_prefix("Bearer "))
                .map(|s| s.trim().to_string());

            let Some(raw_key) = raw_key else {
                warn!(endpoint = %endpoint, ip = %request_ip, "Missing or non-Bearer authorization");
                return Ok(req.into_response(unauthorized()).map_into_right_body());
            };

            // Failed authentications produce no usage row: there is no key
            // to attribute them to, and logging attacker-chosen data under
            // guessed prefixes would poison per-key statistics.
            let authed = match state.api_keys.validate(state.stores.api_keys.as_ref(), &raw_key).await
            {
                Ok(KeyValidation::Valid {
                    key_id,
                    user_id,
                    permissions,
                }) => AuthedKey {
                    key_id,
                    user_id,
                    permissions,
                },
                Ok(KeyValidation::Invalid(rejection)) => {
                    warn!(
                        endpoint = %endpoint,
                        ip = %request_ip,
                        reason = rejection.as_str(),
                        "Rejected API key"
                    );
                    return Ok(req.into_response(unauthorized()).map_into_right_body());
                }
                Err(e) => {
                    error!(endpoint = %endpoint, error = %e, "API key validation failed");
                    return Err(actix_web::error::ErrorInternalServerError(
                        "Authentication backend error",
                    ));
                }
            };

            // Validation succeeded: the touch happens here, whatever the
            // permission gate decides next
            state.usage.touch_last_used(authed.key_id);

            if !is_granted(&state, &authed, &required).await {
                warn!(
                    endpoint = %endpoint,
                    key_id = authed.key_id,
                    required = ?required,
                    "API key denied: insufficient permissions"
                );

                // The key is known, so the denial is attributable
                let log = NewUsageLog {
                    api_key_id: authed.key_id,
                    endpoint,
                    method,
                    status_code: 403,
                    response_time_ms: started.elapsed().as_millis() as i32,
                    request_ip,
                    user_agent,
                };
                if let Err(e) = state.usage.record(log).await {
                    error!(error = %e, "Failed to record denied request");
                }

                return Ok(req.into_response(forbidden()).map_into_right_body());
            }

            let key_id = authed.key_id;
            req.extensions_mut().insert(authed);

            let result = service.call(req).await;

            let status_code = match &result {
                Ok(res) => res.status().as_u16() as i32,
                Err(e) => e.as_response_error().status_code().as_u16() as i32,
            };

            let log = NewUsageLog {
                api_key_id: key_id,
                endpoint,
                method,
                status_code,
                response_time_ms: started.elapsed().as_millis() as i32,
                request_ip,
                user_agent,
            };
            if let Err(e) = state.usage.record(log).await {
                error!(api_key_id = key_id, error = %e, "Failed to record usage log");
            }

            result.map(|res| res.map_into_left_body())
        })
    }
}

/// Evaluate the three grant paths: every required permission present, the
/// key's admin override, or an admin role on the owning account
async fn is_granted(state: &actix_web::web::Data<AppState>, authed: &AuthedKey, required: &[Permission]) -> bool {
    if authed.permissions.allows_all(required) {
        return true;
    }

    match state.stores.users.find_by_id(authed.user_id).await {
        Ok(Some(owner)) => owner.is_admin(),
        Ok(None) => false,
        Err(e) => {
            // Role lookup failure must not widen the grant
            error!(user_id = authed.user_id, error = %e, "Owner role lookup failed");
            false
        }
    }
}
