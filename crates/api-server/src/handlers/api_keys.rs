//! API key management handlers (admin surface)
//!
//! All routes sit behind [`crate::middleware::SessionAuth`]. Non-admin users
//! see and manage only their own keys; keys owned by others answer 404 so
//! the endpoints do not confirm which IDs exist. The plaintext key appears
//! in exactly one place: the creation response.

use actix_web::{web, HttpRequest, HttpResponse};
use shared::models::{ApiKey, PermissionSet, User};
use tracing::info;

use crate::handlers::helpers::{
    bad_request, error_response, extract_user_id_or_unauthorized, handle_store_error,
    require_found, validate_request,
};
use crate::models::{
    ApiKeyResponse, CreateApiKeyRequest, CreatedApiKeyResponse, PaginatedResponse, PaginationMeta,
    SuccessResponse, UpdateApiKeyRequest, UsageQueryParams, UsageStatsResponse,
};
use crate::repositories::{ApiKeyChanges, NewApiKey, UsageWindow};
use crate::AppState;

/// Load the calling user, or the appropriate error response
async fn current_user(state: &AppState, req: &HttpRequest) -> Result<User, HttpResponse> {
    let user_id = extract_user_id_or_unauthorized(req)?;
    let user = handle_store_error(
        state.stores.users.find_by_id(user_id).await,
        "load current user",
    )?;
    require_found(user, "User")
}

/// Load a key the caller is allowed to manage
///
/// Admins reach every key; everyone else only their own. Foreign keys are
/// reported as 404, not 403.
async fn owned_key(state: &AppState, user: &User, id: i64) -> Result<ApiKey, HttpResponse> {
    let key = handle_store_error(state.stores.api_keys.find_by_id(id).await, "load API key")?;
    let key = require_found(key, "API key")?;

    if key.user_id != user.id && !user.is_admin() {
        return Err(require_found::<ApiKey>(None, "API key").unwrap_err());
    }

    Ok(key)
}

/// POST /api/v1/api-keys
pub async fn create_api_key(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<CreateApiKeyRequest>,
) -> HttpResponse {
    let user = match current_user(&state, &req).await {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    if let Err(resp) = validate_request(&*body) {
        return resp;
    }

    let body = body.into_inner();
    if let Some(expires_at) = body.expires_at {
        if expires_at <= chrono::Utc::now() {
            return bad_request("Expiry must be in the future");
        }
    }

    // Admins may mint keys for other accounts; everyone else only for
    // themselves
    let target_user_id = match body.user_id {
        Some(id) if id != user.id => {
            if !user.is_admin() {
                return error_response(&shared::Error::authorization(
                    "Only admins may create keys for other users",
                ));
            }
            let target = match handle_store_error(
                state.stores.users.find_by_id(id).await,
                "load target user",
            ) {
                Ok(target) => target,
                Err(resp) => return resp,
            };
            match require_found(target, "User") {
                Ok(target) => target.id,
                Err(resp) => return resp,
            }
        }
        _ => user.id,
    };

    let generated = match handle_store_error(state.api_keys.generate(), "generate API key") {
        Ok(g) => g,
        Err(resp) => return resp,
    };

    let key = match handle_store_error(
        state
            .stores
            .api_keys
            .insert(NewApiKey {
                user_id: target_user_id,
                name: body.name,
                key_hash: generated.hash,
                prefix: generated.prefix,
                permissions: body.permissions.unwrap_or_else(PermissionSet::read_only),
                expires_at: body.expires_at,
            })
            .await,
        "create API key",
    ) {
        Ok(key) => key,
        Err(resp) => return resp,
    };

    info!(
        key_id = key.id,
        owner_id = key.user_id,
        created_by = user.id,
        prefix = %key.prefix,
        "API key created"
    );

    HttpResponse::Created().json(CreatedApiKeyResponse {
        message: "API key created; the plaintext key is shown only once".to_string(),
        api_key: key.into(),
        key: generated.key,
    })
}

/// GET /api/v1/api-keys
pub async fn list_api_keys(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    let user = match current_user(&state, &req).await {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    let result = if user.is_admin() {
        state.stores.api_keys.list_all().await
    } else {
        state.stores.api_keys.list_by_user(user.id).await
    };

    match handle_store_error(result, "list API keys") {
        Ok(keys) => {
            let keys: Vec<ApiKeyResponse> = keys.into_iter().map(Into::into).collect();
            HttpResponse::Ok().json(SuccessResponse::new(keys))
        }
        Err(resp) => resp,
    }
}

/// GET /api/v1/api-keys/{id}
pub async fn get_api_key(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> HttpResponse {
    let user = match current_user(&state, &req).await {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    match owned_key(&state, &user, path.into_inner()).await {
        Ok(key) => HttpResponse::Ok().json(SuccessResponse::new(ApiKeyResponse::from(key))),
        Err(resp) => resp,
    }
}

/// PATCH /api/v1/api-keys/{id}
pub async fn update_api_key(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<UpdateApiKeyRequest>,
) -> HttpResponse {
    let user = match current_user(&state, &req).await {
        Ok(user) => user,
        Err(resp) => return resp,
    };
    if let Err(resp) = validate_request(&*body) {
        return resp;
    }

    let key = match owned_key(&state, &user, path.into_inner()).await {
        Ok(key) => key,
        Err(resp) => return resp,
    };

    let body = body.into_inner();
    let changes = ApiKeyChanges {
        name: body.name,
        permissions: body.permissions,
        enabled: body.enabled,
        expires_at: body.expires_at,
    };
    if changes.is_empty() {
        return bad_request("No fields to update");
    }
    if let Some(Some(expires_at)) = changes.expires_at {
        if expires_at <= chrono::Utc::now() {
            return bad_request("Expiry must be in the future");
        }
    }

    match handle_store_error(
        state.stores.api_keys.update(key.id, changes).await,
        "update API key",
    ) {
        Ok(Some(updated)) => {
            info!(key_id = updated.id, user_id = user.id, "API key updated");
            HttpResponse::Ok().json(SuccessResponse::new(ApiKeyResponse::from(updated)))
        }
        Ok(None) => require_found::<ApiKey>(None, "API key").unwrap_err(),
        Err(resp) => resp,
    }
}

/// DELETE /api/v1/api-keys/{id}
pub async fn delete_api_key(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> HttpResponse {
    let user = match current_user(&state, &req).await {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    let key = match owned_key(&state, &user, path.into_inner()).await {
        Ok(key) => key,
        Err(resp) => return resp,
    };

    match handle_store_error(state.stores.api_keys.delete(key.id).await, "delete API key") {
        Ok(true) => {
            info!(key_id = key.id, user_id = user.id, "API key deleted");
            HttpResponse::NoContent().finish()
        }
        Ok(false) => require_found::<ApiKey>(None, "API key").unwrap_err(),
        Err(resp) => resp,
    }
}

/// GET /api/v1/api-keys/{id}/usage
pub async fn key_usage(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    query: web::Query<UsageQueryParams>,
) -> HttpResponse {
    let user = match current_user(&state, &req).await {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    let key = match owned_key(&state, &user, path.into_inner()).await {
        Ok(key) => key,
        Err(resp) => return resp,
    };

    let query = query.into_inner();
    if query.limit < 1 || query.limit > 500 {
        return bad_request("Limit must be between 1 and 500");
    }
    if query.offset < 0 {
        return bad_request("Offset must be non-negative");
    }

    let window = UsageWindow {
        from: query.from,
        to: query.to,
    };

    let logs = match handle_store_error(
        state
            .stores
            .usage
            .list_for_key(key.id, window, query.limit, query.offset)
            .await,
        "list usage logs",
    ) {
        Ok(logs) => logs,
        Err(resp) => return resp,
    };
    let total = match handle_store_error(
        state.stores.usage.count_for_key(key.id, window).await,
        "count usage logs",
    ) {
        Ok(total) => total,
        Err(resp) => return resp,
    };

    HttpResponse::Ok().json(PaginatedResponse {
        data: logs,
        pagination: PaginationMeta::new(total, query.limit, query.offset),
    })
}

/// GET /api/v1/api-keys/{id}/usage/stats
pub async fn key_usage_stats(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    query: web::Query<UsageQueryParams>,
) -> HttpResponse {
    let user = match current_user(&state, &req).await {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    let key = match owned_key(&state, &user, path.into_inner()).await {
        Ok(key) => key,
        Err(resp) => return resp,
    };

    let window = UsageWindow {
        from: query.from,
        to: query.to,
    };

    match handle_store_error(
        state.stores.usage.stats_for_key(key.id, window).await,
        "compute usage stats",
    ) {
        Ok(stats) => HttpResponse::Ok().json(UsageStatsResponse {
            api_key_id: key.id,
            total_requests: stats.total_requests,
            error_requests: stats.error_requests,
            success_rate: if stats.total_requests == 0 {
                0.0
            } else {
                (stats.total_requests - stats.error_requests) as f64 * 100.0
                    / stats.total_requests as f64
            },
            avg_response_time_ms: stats.avg_response_time_ms,
            requests_by_endpoint: stats
                .requests_by_endpoint
                .into_iter()
                .map(|(endpoint, count)| crate::models::EndpointCount { endpoint, count })
                .collect(),
        }),
        Err(resp) => resp,
    }
}
