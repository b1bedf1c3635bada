//! Portfolio API server binary
//!
//! Admin API for key management plus the key-gated public REST API.

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use api_server::{middleware, routes, services::ApiKeyService, AppState};
use shared::rate_limit::{MemoryCounter, RedisCounter, RequestCounter};
use shared::{db, Config};
use std::sync::Arc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    shared::init_tracing();

    tracing::info!("Starting API server...");

    let config = Config::from_env().context("Failed to load configuration")?;

    let db_pool = db::create_pool(&config.database)
        .await
        .context("Failed to create database pool")?;

    db::check_health(&db_pool)
        .await
        .context("Database health check failed")?;

    // Redis counter when configured; process-local counting otherwise
    let counter: Arc<dyn RequestCounter> = match &config.redis {
        Some(redis) => {
            let counter = RedisCounter::connect(&redis.url)
                .await
                .context("Failed to connect to Redis")?;
            tracing::info!("Rate limiting backed by Redis");
            Arc::new(counter)
        }
        None => {
            tracing::info!("Rate limiting in-process (single instance only)");
            Arc::new(MemoryCounter::new())
        }
    };

    let stores = api_server::repositories::Stores::postgres(db_pool.clone());
    let state = AppState::new(
        config.clone(),
        stores,
        ApiKeyService::new(),
        counter,
        Some(db_pool),
    );

    let server_addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("API server listening on {}", server_addr);

    HttpServer::new(move || {
        App::new()
            .wrap(tracing_actix_web::TracingLogger::default())
            .wrap(middleware::cors())
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure)
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind to {}", server_addr))?
    .run()
    .await
    .context("Server error")?;

    Ok(())
}
