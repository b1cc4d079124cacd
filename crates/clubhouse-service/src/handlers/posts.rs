//! Post handlers.
//!
//! - `POST /api/v1/sections/{section_id}/posts` - Create post
//! - `GET /api/v1/posts/{id}` - Get post
//! - `PATCH /api/v1/posts/{id}` - Update post (author only)
//! - `DELETE /api/v1/posts/{id}` - Delete post (author only)
//!
//! Writes respond as soon as the row is committed; events and mentions go
//! out through the fan-out service afterwards.

use crate::auth::AuthenticatedUser;
use crate::errors::ClubhouseError;
use crate::handlers::JsonBody;
use crate::models::{CreatePostRequest, PostResponse, PostRow, UpdatePostRequest};
use crate::repositories::PostsRepository;
use crate::routes::AppState;
use crate::services::FanoutJob;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use common::types::{PostId, SectionId};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Handler for POST /api/v1/sections/{section_id}/posts
#[instrument(skip_all, name = "clubhouse.handlers.create_post", fields(section_id = %section_id))]
pub async fn create_post(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(section_id): Path<Uuid>,
    JsonBody(request): JsonBody<CreatePostRequest>,
) -> Result<(StatusCode, Json<PostResponse>), ClubhouseError> {
    request
        .validate()
        .map_err(|e| ClubhouseError::Validation(e.to_string()))?;

    let row = PostsRepository::create(
        &state.pool,
        SectionId(section_id),
        user.user_id,
        request.title.trim(),
        request.content.trim(),
    )
    .await?;
    let post = PostResponse::from(row);

    info!(
        target: "clubhouse.handlers.posts",
        post_id = %post.id,
        author_id = %post.author_id,
        content_len = post.content.len(),
        "Post created"
    );

    state.fanout.dispatch(FanoutJob::PostCreated(post.clone()));

    Ok((StatusCode::CREATED, Json(post)))
}

/// Handler for GET /api/v1/posts/{id}
#[instrument(skip_all, name = "clubhouse.handlers.get_post", fields(post_id = %post_id))]
pub async fn get_post(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<PostResponse>, ClubhouseError> {
    let row = find_post(&state, PostId(post_id)).await?;
    Ok(Json(PostResponse::from(row)))
}

/// Handler for PATCH /api/v1/posts/{id}
#[instrument(skip_all, name = "clubhouse.handlers.update_post", fields(post_id = %post_id))]
pub async fn update_post(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(post_id): Path<Uuid>,
    JsonBody(request): JsonBody<UpdatePostRequest>,
) -> Result<Json<PostResponse>, ClubhouseError> {
    request
        .validate()
        .map_err(|e| ClubhouseError::Validation(e.to_string()))?;

    let post_id = PostId(post_id);
    let existing = find_post(&state, post_id).await?;
    ensure_author(&existing, &user)?;

    let row = PostsRepository::update(
        &state.pool,
        post_id,
        request.title.as_deref().map(str::trim),
        request.content.as_deref().map(str::trim),
    )
    .await?
    .ok_or_else(|| ClubhouseError::NotFound("Post not found".to_string()))?;
    let post = PostResponse::from(row);

    info!(target: "clubhouse.handlers.posts", post_id = %post.id, "Post updated");

    state.fanout.dispatch(FanoutJob::PostUpdated {
        post: post.clone(),
        previous_content: existing.content,
    });

    Ok(Json(post))
}

/// Handler for DELETE /api/v1/posts/{id}
#[instrument(skip_all, name = "clubhouse.handlers.delete_post", fields(post_id = %post_id))]
pub async fn delete_post(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(post_id): Path<Uuid>,
) -> Result<StatusCode, ClubhouseError> {
    let post_id = PostId(post_id);
    let existing = find_post(&state, post_id).await?;
    ensure_author(&existing, &user)?;

    if !PostsRepository::delete(&state.pool, post_id).await? {
        return Err(ClubhouseError::NotFound("Post not found".to_string()));
    }

    info!(target: "clubhouse.handlers.posts", post_id = %post_id, "Post deleted");

    state.fanout.dispatch(FanoutJob::PostDeleted {
        post_id,
        section_id: SectionId(existing.section_id),
        author_id: user.user_id,
    });

    Ok(StatusCode::NO_CONTENT)
}

async fn find_post(state: &AppState, post_id: PostId) -> Result<PostRow, ClubhouseError> {
    PostsRepository::get(&state.pool, post_id)
        .await?
        .ok_or_else(|| ClubhouseError::NotFound("Post not found".to_string()))
}

fn ensure_author(post: &PostRow, user: &AuthenticatedUser) -> Result<(), ClubhouseError> {
    if post.author_id != user.user_id.as_uuid() {
        tracing::debug!(
            target: "clubhouse.handlers.posts",
            post_id = %post.post_id,
            user_id = %user.user_id,
            "Rejected change by non-author"
        );
        return Err(ClubhouseError::Forbidden(
            "Only the author can change this post".to_string(),
        ));
    }
    Ok(())
}
