//! Comment handlers.
//!
//! - `POST /api/v1/posts/{post_id}/comments` - Create comment
//! - `GET /api/v1/posts/{post_id}/comments` - List comments, oldest first
//! - `PATCH /api/v1/comments/{id}` - Update comment (author only)
//! - `DELETE /api/v1/comments/{id}` - Delete comment (author only)

use crate::auth::AuthenticatedUser;
use crate::errors::ClubhouseError;
use crate::handlers::JsonBody;
use crate::models::{CommentResponse, CommentRow, CreateCommentRequest, UpdateCommentRequest};
use crate::repositories::{CommentsRepository, PostsRepository};
use crate::routes::AppState;
use crate::services::FanoutJob;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use common::types::{CommentId, PostId};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Handler for POST /api/v1/posts/{post_id}/comments
#[instrument(skip_all, name = "clubhouse.handlers.create_comment", fields(post_id = %post_id))]
pub async fn create_comment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(post_id): Path<Uuid>,
    JsonBody(request): JsonBody<CreateCommentRequest>,
) -> Result<(StatusCode, Json<CommentResponse>), ClubhouseError> {
    request
        .validate()
        .map_err(|e| ClubhouseError::Validation(e.to_string()))?;

    let post_id = PostId(post_id);
    ensure_post_exists(&state, post_id).await?;

    let parent_comment_id = request.parent_comment_id.map(CommentId);
    if let Some(parent_id) = parent_comment_id {
        let parent = CommentsRepository::get(&state.pool, parent_id).await?;
        if parent.map(|p| p.post_id) != Some(post_id.as_uuid()) {
            return Err(ClubhouseError::Validation(
                "Parent comment does not belong to this post".to_string(),
            ));
        }
    }

    let row = CommentsRepository::create(
        &state.pool,
        post_id,
        user.user_id,
        parent_comment_id,
        request.content.trim(),
    )
    .await?;
    let comment = CommentResponse::from(row);

    info!(
        target: "clubhouse.handlers.comments",
        comment_id = %comment.id,
        post_id = %comment.post_id,
        content_len = comment.content.len(),
        "Comment created"
    );

    state
        .fanout
        .dispatch(FanoutJob::CommentCreated(comment.clone()));

    Ok((StatusCode::CREATED, Json(comment)))
}

/// Handler for GET /api/v1/posts/{post_id}/comments
#[instrument(skip_all, name = "clubhouse.handlers.list_comments", fields(post_id = %post_id))]
pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<Vec<CommentResponse>>, ClubhouseError> {
    let post_id = PostId(post_id);
    ensure_post_exists(&state, post_id).await?;

    let rows = CommentsRepository::list_for_post(&state.pool, post_id).await?;
    Ok(Json(rows.into_iter().map(CommentResponse::from).collect()))
}

/// Handler for PATCH /api/v1/comments/{id}
#[instrument(skip_all, name = "clubhouse.handlers.update_comment", fields(comment_id = %comment_id))]
pub async fn update_comment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(comment_id): Path<Uuid>,
    JsonBody(request): JsonBody<UpdateCommentRequest>,
) -> Result<Json<CommentResponse>, ClubhouseError> {
    request
        .validate()
        .map_err(|e| ClubhouseError::Validation(e.to_string()))?;

    let comment_id = CommentId(comment_id);
    let existing = find_comment(&state, comment_id).await?;
    ensure_author(&existing, &user)?;

    let row = CommentsRepository::update(&state.pool, comment_id, request.content.trim())
        .await?
        .ok_or_else(|| ClubhouseError::NotFound("Comment not found".to_string()))?;
    let comment = CommentResponse::from(row);

    info!(target: "clubhouse.handlers.comments", comment_id = %comment.id, "Comment updated");

    state.fanout.dispatch(FanoutJob::CommentUpdated {
        comment: comment.clone(),
        previous_content: existing.content,
    });

    Ok(Json(comment))
}

/// Handler for DELETE /api/v1/comments/{id}
#[instrument(skip_all, name = "clubhouse.handlers.delete_comment", fields(comment_id = %comment_id))]
pub async fn delete_comment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(comment_id): Path<Uuid>,
) -> Result<StatusCode, ClubhouseError> {
    let comment_id = CommentId(comment_id);
    let existing = find_comment(&state, comment_id).await?;
    ensure_author(&existing, &user)?;

    if !CommentsRepository::delete(&state.pool, comment_id).await? {
        return Err(ClubhouseError::NotFound("Comment not found".to_string()));
    }

    info!(target: "clubhouse.handlers.comments", comment_id = %comment_id, "Comment deleted");

    state.fanout.dispatch(FanoutJob::CommentDeleted {
        comment_id,
        post_id: PostId(existing.post_id),
        author_id: user.user_id,
    });

    Ok(StatusCode::NO_CONTENT)
}

async fn ensure_post_exists(state: &AppState, post_id: PostId) -> Result<(), ClubhouseError> {
    match PostsRepository::get(&state.pool, post_id).await? {
        Some(_) => Ok(()),
        None => Err(ClubhouseError::NotFound("Post not found".to_string())),
    }
}

async fn find_comment(state: &AppState, comment_id: CommentId) -> Result<CommentRow, ClubhouseError> {
    CommentsRepository::get(&state.pool, comment_id)
        .await?
        .ok_or_else(|| ClubhouseError::NotFound("Comment not found".to_string()))
}

fn ensure_author(comment: &CommentRow, user: &AuthenticatedUser) -> Result<(), ClubhouseError> {
    if comment.author_id != user.user_id.as_uuid() {
        return Err(ClubhouseError::Forbidden(
            "Only the author can change this comment".to_string(),
        ));
    }
    Ok(())
}
