//! Public blog post handlers
//!
//! Reads require `read_posts`; creation requires `write_posts`. Permission
//! enforcement happens in the route-level API key middleware, so these
//! handlers only see authenticated requests.

use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};
use shared::Error;
use tracing::info;

use crate::handlers::helpers::{conflict, handle_store_error, require_found, validate_request};
use crate::middleware::AuthedKey;
use crate::models::{
    CreatePostRequest, ErrorResponse, PaginatedResponse, PaginationMeta, PaginationParams,
    SuccessResponse,
};
use crate::repositories::NewPost;
use crate::AppState;

/// GET /api/public/v1/posts
pub async fn list_posts(
    state: web::Data<AppState>,
    query: web::Query<PaginationParams>,
) -> HttpResponse {
    let params = query.into_inner();
    if let Err(message) = params.validate() {
        return HttpResponse::BadRequest().json(ErrorResponse::new("validation_error", message));
    }

    let posts = match handle_store_error(
        state
            .stores
            .posts
            .list_published(params.limit, params.offset)
            .await,
        "list posts",
    ) {
        Ok(posts) => posts,
        Err(resp) => return resp,
    };
    let total = match handle_store_error(state.stores.posts.count_published().await, "count posts")
    {
        Ok(total) => total,
        Err(resp) => return resp,
    };

    HttpResponse::Ok().json(PaginatedResponse {
        data: posts,
        pagination: PaginationMeta::new(total, params.limit, params.offset),
    })
}

/// GET /api/public/v1/posts/{slug}
pub async fn get_post(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let slug = path.into_inner();

    let post = match handle_store_error(
        state.stores.posts.find_published_by_slug(&slug).await,
        "load post",
    ) {
        Ok(post) => post,
        Err(resp) => return resp,
    };

    match require_found(post, "Post") {
        Ok(post) => HttpResponse::Ok().json(SuccessResponse::new(post)),
        Err(resp) => resp,
    }
}

/// POST /api/public/v1/posts
pub async fn create_post(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<CreatePostRequest>,
) -> HttpResponse {
    if let Err(resp) = validate_request(&*body) {
        return resp;
    }

    // The key middleware put the validated identity here
    let Some(authed) = req.extensions().get::<AuthedKey>().cloned() else {
        tracing::error!("Post creation reached handler without key context");
        return HttpResponse::InternalServerError()
            .json(ErrorResponse::new("internal_error", "Failed to create post"));
    };

    let body = body.into_inner();
    let result = state
        .stores
        .posts
        .insert(NewPost {
            author_id: authed.user_id,
            slug: body.slug,
            title: body.title,
            excerpt: body.excerpt,
            content: body.content,
            published: body.published,
        })
        .await;

    match result {
        Ok(post) => {
            info!(post_id = post.id, author_id = post.author_id, slug = %post.slug, "Post created");
            HttpResponse::Created().json(SuccessResponse::new(post))
        }
        Err(Error::Validation(message)) => conflict(&message),
        Err(e) => {
            tracing::error!(error = %e, "Failed to create post");
            HttpResponse::InternalServerError()
                .json(ErrorResponse::new("internal_error", "Failed to create post"))
        }
    }
}
