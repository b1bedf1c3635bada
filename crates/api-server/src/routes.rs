//! Route configuration
//!
//! Two surfaces:
//!
//! - `/api/v1`: management API. Session JWT required everywhere except
//!   login and health.
//! - `/api/public/v1`: key-gated public API. Per-IP rate limiting wraps
//!   the whole scope; each route declares the permissions its method needs.
//!   The same path is registered once per method where the required
//!   permissions differ, using method guards to route between them.

use actix_web::{guard, web};
use shared::models::Permission;

use crate::handlers;
use crate::middleware::{ApiKeyAuth, IpRateLimit, SessionAuth};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(handlers::health::health))
            .route("/auth/login", web::post().to(handlers::auth::login))
            .service(
                web::scope("/api-keys")
                    .wrap(SessionAuth)
                    .route("", web::post().to(handlers::api_keys::create_api_key))
                    .route("", web::get().to(handlers::api_keys::list_api_keys))
                    .route("/{id}", web::get().to(handlers::api_keys::get_api_key))
                    .route("/{id}", web::patch().to(handlers::api_keys::update_api_key))
                    .route("/{id}", web::delete().to(handlers::api_keys::delete_api_key))
                    .route("/{id}/usage", web::get().to(handlers::api_keys::key_usage))
                    .route(
                        "/{id}/usage/stats",
                        web::get().to(handlers::api_keys::key_usage_stats),
                    ),
            ),
    )
    .service(
        web::scope("/api/public/v1")
            .wrap(IpRateLimit)
            .service(
                web::resource("/posts")
                    .guard(guard::Get())
                    .wrap(ApiKeyAuth::require(&[Permission::ReadPosts]))
                    .route(web::get().to(handlers::posts::list_posts)),
            )
            .service(
                web::resource("/posts")
                    .guard(guard::Post())
                    .wrap(ApiKeyAuth::require(&[Permission::WritePosts]))
                    .route(web::post().to(handlers::posts::create_post)),
            )
            .service(
                web::resource("/posts/{slug}")
                    .guard(guard::Get())
                    .wrap(ApiKeyAuth::require(&[Permission::ReadPosts]))
                    .route(web::get().to(handlers::posts::get_post)),
            )
            .service(
                web::resource("/users/{id}")
                    .guard(guard::Get())
                    .wrap(ApiKeyAuth::require(&[Permission::ReadUsers]))
                    .route(web::get().to(handlers::users::get_user)),
            ),
    );
}
