//! Comments repository.

use crate::errors::ClubhouseError;
use crate::models::CommentRow;
use common::types::{CommentId, PostId, UserId};
use sqlx::PgPool;
use tracing::instrument;

/// Repository for comment operations.
pub struct CommentsRepository;

impl CommentsRepository {
    #[instrument(skip_all, name = "clubhouse.repo.comments.create", fields(post_id = %post_id))]
    pub async fn create(
        pool: &PgPool,
        post_id: PostId,
        author_id: UserId,
        parent_comment_id: Option<CommentId>,
        content: &str,
    ) -> Result<CommentRow, ClubhouseError> {
        let row: CommentRow = sqlx::query_as(
            r#"
            INSERT INTO comments (comment_id, post_id, author_id, parent_comment_id, content)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING comment_id, post_id, author_id, parent_comment_id, content,
                      created_at, updated_at
            "#,
        )
        .bind(CommentId::new().as_uuid())
        .bind(post_id.as_uuid())
        .bind(author_id.as_uuid())
        .bind(parent_comment_id.map(|id| id.as_uuid()))
        .bind(content)
        .fetch_one(pool)
        .await?;

        Ok(row)
    }

    #[instrument(skip_all, name = "clubhouse.repo.comments.get", fields(comment_id = %comment_id))]
    pub async fn get(
        pool: &PgPool,
        comment_id: CommentId,
    ) -> Result<Option<CommentRow>, ClubhouseError> {
        let row: Option<CommentRow> = sqlx::query_as(
            r#"
            SELECT comment_id, post_id, author_id, parent_comment_id, content,
                   created_at, updated_at
            FROM comments
            WHERE comment_id = $1
            "#,
        )
        .bind(comment_id.as_uuid())
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    /// Comments on a post, oldest first.
    #[instrument(skip_all, name = "clubhouse.repo.comments.list_for_post", fields(post_id = %post_id))]
    pub async fn list_for_post(
        pool: &PgPool,
        post_id: PostId,
    ) -> Result<Vec<CommentRow>, ClubhouseError> {
        let rows: Vec<CommentRow> = sqlx::query_as(
            r#"
            SELECT comment_id, post_id, author_id, parent_comment_id, content,
                   created_at, updated_at
            FROM comments
            WHERE post_id = $1
            ORDER BY created_at ASC, comment_id ASC
            "#,
        )
        .bind(post_id.as_uuid())
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    #[instrument(skip_all, name = "clubhouse.repo.comments.update", fields(comment_id = %comment_id))]
    pub async fn update(
        pool: &PgPool,
        comment_id: CommentId,
        content: &str,
    ) -> Result<Option<CommentRow>, ClubhouseError> {
        let row: Option<CommentRow> = sqlx::query_as(
            r#"
            UPDATE comments
            SET content = $2, updated_at = NOW()
            WHERE comment_id = $1
            RETURNING comment_id, post_id, author_id, parent_comment_id, content,
                      created_at, updated_at
            "#,
        )
        .bind(comment_id.as_uuid())
        .bind(content)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    #[instrument(skip_all, name = "clubhouse.repo.comments.delete", fields(comment_id = %comment_id))]
    pub async fn delete(pool: &PgPool, comment_id: CommentId) -> Result<bool, ClubhouseError> {
        let result = sqlx::query("DELETE FROM comments WHERE comment_id = $1")
            .bind(comment_id.as_uuid())
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
