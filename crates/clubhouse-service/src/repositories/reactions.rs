//! Post reactions repository.
//!
//! A reaction is the triple (post, user, emoji). Adding and removing are
//! idempotent; both report the emoji's count afterwards.

use crate::errors::ClubhouseError;
use common::types::{PostId, UserId};
use sqlx::PgPool;
use tracing::instrument;

/// Repository for reaction operations.
pub struct ReactionsRepository;

impl ReactionsRepository {
    /// Add a reaction. Returns `(count, newly_added)`.
    #[instrument(skip_all, name = "clubhouse.repo.reactions.add", fields(post_id = %post_id))]
    pub async fn add(
        pool: &PgPool,
        post_id: PostId,
        user_id: UserId,
        emoji: &str,
    ) -> Result<(i64, bool), ClubhouseError> {
        let result = sqlx::query(
            r#"
            INSERT INTO post_reactions (post_id, user_id, emoji)
            VALUES ($1, $2, $3)
            ON CONFLICT (post_id, user_id, emoji) DO NOTHING
            "#,
        )
        .bind(post_id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(emoji)
        .execute(pool)
        .await?;

        let count = Self::count(pool, post_id, emoji).await?;
        Ok((count, result.rows_affected() > 0))
    }

    /// Remove a reaction. Returns `(count, removed)`.
    #[instrument(skip_all, name = "clubhouse.repo.reactions.remove", fields(post_id = %post_id))]
    pub async fn remove(
        pool: &PgPool,
        post_id: PostId,
        user_id: UserId,
        emoji: &str,
    ) -> Result<(i64, bool), ClubhouseError> {
        let result = sqlx::query(
            "DELETE FROM post_reactions WHERE post_id = $1 AND user_id = $2 AND emoji = $3",
        )
        .bind(post_id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(emoji)
        .execute(pool)
        .await?;

        let count = Self::count(pool, post_id, emoji).await?;
        Ok((count, result.rows_affected() > 0))
    }

    async fn count(pool: &PgPool, post_id: PostId, emoji: &str) -> Result<i64, ClubhouseError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM post_reactions WHERE post_id = $1 AND emoji = $2",
        )
        .bind(post_id.as_uuid())
        .bind(emoji)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }
}
