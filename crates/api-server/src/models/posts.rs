//! Blog post DTOs

use serde::Deserialize;
use validator::Validate;

/// Request body for creating a post via the public API
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePostRequest {
    #[validate(length(min = 1, max = 200, message = "Slug must be 1-200 characters"))]
    #[validate(custom(function = "validate_slug"))]
    pub slug: String,

    #[validate(length(min = 1, max = 300, message = "Title must be 1-300 characters"))]
    pub title: String,

    #[validate(length(max = 500, message = "Excerpt must be at most 500 characters"))]
    pub excerpt: Option<String>,

    #[validate(length(min = 1, message = "Content is required"))]
    pub content: String,

    #[serde(default)]
    pub published: bool,
}

fn validate_slug(slug: &str) -> Result<(), validator::ValidationError> {
    let valid = !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !slug.starts_with('-')
        && !slug.ends_with('-');
    if valid {
        Ok(())
    } else {
        Err(validator::ValidationError::new("invalid_slug"))
    }
}
