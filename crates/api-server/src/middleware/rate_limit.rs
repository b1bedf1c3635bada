//! Per-IP admission control for the public API
//!
//! Runs before API key validation so that brute-force traffic is turned
//! away without spending any Argon2 budget. The counting backend comes from
//! application state: in-memory for single instances, Redis when configured.

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error as ActixError, HttpResponse,
};
use futures_util::future::LocalBoxFuture;
use shared::rate_limit::RateScope;
use std::future::{ready, Ready};
use std::rc::Rc;
use tracing::{error, warn};

use crate::middleware::ip_extractor;
use crate::models::ErrorResponse;
use crate::AppState;

fn too_many_requests(retry_after_secs: i64) -> HttpResponse {
    HttpResponse::TooManyRequests()
        .insert_header(("Retry-After", retry_after_secs.to_string()))
        .json(ErrorResponse::new(
            "rate_limited",
            "Too many requests; slow down",
        ))
}

/// Middleware factory for per-IP rate limiting
pub struct IpRateLimit;

impl<S, B> Transform<S, ServiceRequest> for IpRateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = ActixError;
    type InitError = ();
    type Transform = IpRateLimitMiddleware<S>;
    type Future = Ready<std::result::Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(IpRateLimitMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct IpRateLimitMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for IpRateLimitMiddleware<S>
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
                    error!("Application state not found");
                    return Err(actix_web::error::ErrorInternalServerError(
                        "Server configuration error",
                    ));
                }
            };

            let ip = ip_extractor::extract_ip(req.request());
            let scope = RateScope::Ip(ip.clone());
            let limit = state.config.server.public_rate_limit;

            match state.counter.check(&scope, limit).await {
                Ok(decision) if decision.allowed => {
                    service.call(req).await.map(|res| res.map_into_left_body())
                }
                Ok(decision) => {
                    warn!(ip = %ip, limit = limit, "Rate limit exceeded");
                    let response = too_many_requests(decision.retry_after_secs);
                    Ok(req.into_response(response).map_into_right_body())
                }
                Err(e) => {
                    // Counting must never take the API down; admit and log
                    error!(ip = %ip, error = %e, "Rate counter failure, admitting request");
                    service.call(req).await.map(|res| res.map_into_left_body())
                }
            }
        })
    }
}
