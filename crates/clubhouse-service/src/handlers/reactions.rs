//! Reaction handlers.
//!
//! - `PUT /api/v1/posts/{id}/reactions/{emoji}` - Add the caller's reaction
//! - `DELETE /api/v1/posts/{id}/reactions/{emoji}` - Remove it
//!
//! Both are idempotent. An event is published only when the call changed
//! something.

use crate::auth::AuthenticatedUser;
use crate::errors::ClubhouseError;
use crate::models::{validate_emoji, ReactionEventData, ReactionResponse};
use crate::repositories::{PostsRepository, ReactionsRepository};
use crate::routes::AppState;
use crate::services::FanoutJob;
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use common::types::PostId;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Handler for PUT /api/v1/posts/{id}/reactions/{emoji}
#[instrument(skip_all, name = "clubhouse.handlers.add_reaction", fields(post_id = %post_id))]
pub async fn add_reaction(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((post_id, emoji)): Path<(Uuid, String)>,
) -> Result<Json<ReactionResponse>, ClubhouseError> {
    let post_id = PostId(post_id);
    validate_emoji(&emoji).map_err(|e| ClubhouseError::Validation(e.to_string()))?;
    ensure_post_exists(&state, post_id).await?;

    let (count, added) =
        ReactionsRepository::add(&state.pool, post_id, user.user_id, &emoji).await?;

    if added {
        state.fanout.dispatch(FanoutJob::ReactionAdded(ReactionEventData {
            post_id,
            user_id: user.user_id,
            emoji: emoji.clone(),
            count,
        }));
    }

    Ok(Json(ReactionResponse {
        post_id,
        emoji,
        count,
        reacted: true,
    }))
}

/// Handler for DELETE /api/v1/posts/{id}/reactions/{emoji}
#[instrument(skip_all, name = "clubhouse.handlers.remove_reaction", fields(post_id = %post_id))]
pub async fn remove_reaction(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((post_id, emoji)): Path<(Uuid, String)>,
) -> Result<Json<ReactionResponse>, ClubhouseError> {
    let post_id = PostId(post_id);
    validate_emoji(&emoji).map_err(|e| ClubhouseError::Validation(e.to_string()))?;
    ensure_post_exists(&state, post_id).await?;

    let (count, removed) =
        ReactionsRepository::remove(&state.pool, post_id, user.user_id, &emoji).await?;

    if removed {
        state
            .fanout
            .dispatch(FanoutJob::ReactionRemoved(ReactionEventData {
                post_id,
                user_id: user.user_id,
                emoji: emoji.clone(),
                count,
            }));
    }

    Ok(Json(ReactionResponse {
        post_id,
        emoji,
        count,
        reacted: false,
    }))
}

async fn ensure_post_exists(state: &AppState, post_id: PostId) -> Result<(), ClubhouseError> {
    match PostsRepository::get(&state.pool, post_id).await? {
        Some(_) => Ok(()),
        None => Err(ClubhouseError::NotFound("Post not found".to_string())),
    }
}
