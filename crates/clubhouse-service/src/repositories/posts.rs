//! Posts repository.
//!
//! # Security
//!
//! - All queries use parameterized statements
//! - Post content is never logged

use crate::errors::ClubhouseError;
use crate::models::PostRow;
use common::types::{PostId, SectionId, UserId};
use sqlx::PgPool;
use tracing::instrument;

/// Repository for post operations.
pub struct PostsRepository;

impl PostsRepository {
    /// Insert a post. Returns `NotFound` if the section does not exist.
    #[instrument(skip_all, name = "clubhouse.repo.posts.create", fields(section_id = %section_id))]
    pub async fn create(
        pool: &PgPool,
        section_id: SectionId,
        author_id: UserId,
        title: &str,
        content: &str,
    ) -> Result<PostRow, ClubhouseError> {
        let row: Option<PostRow> = sqlx::query_as(
            r#"
            INSERT INTO posts (post_id, section_id, author_id, title, content)
            SELECT $1, s.section_id, $3, $4, $5
            FROM sections s
            WHERE s.section_id = $2
            RETURNING post_id, section_id, author_id, title, content, created_at, updated_at
            "#,
        )
        .bind(PostId::new().as_uuid())
        .bind(section_id.as_uuid())
        .bind(author_id.as_uuid())
        .bind(title)
        .bind(content)
        .fetch_optional(pool)
        .await?;

        row.ok_or_else(|| ClubhouseError::NotFound("Section not found".to_string()))
    }

    #[instrument(skip_all, name = "clubhouse.repo.posts.get", fields(post_id = %post_id))]
    pub async fn get(pool: &PgPool, post_id: PostId) -> Result<Option<PostRow>, ClubhouseError> {
        let row: Option<PostRow> = sqlx::query_as(
            r#"
            SELECT post_id, section_id, author_id, title, content, created_at, updated_at
            FROM posts
            WHERE post_id = $1
            "#,
        )
        .bind(post_id.as_uuid())
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    /// Update title and/or content. `None` leaves a field unchanged.
    #[instrument(skip_all, name = "clubhouse.repo.posts.update", fields(post_id = %post_id))]
    pub async fn update(
        pool: &PgPool,
        post_id: PostId,
        title: Option<&str>,
        content: Option<&str>,
    ) -> Result<Option<PostRow>, ClubhouseError> {
        let row: Option<PostRow> = sqlx::query_as(
            r#"
            UPDATE posts
            SET title = COALESCE($2, title),
                content = COALESCE($3, content),
                updated_at = NOW()
            WHERE post_id = $1
            RETURNING post_id, section_id, author_id, title, content, created_at, updated_at
            "#,
        )
        .bind(post_id.as_uuid())
        .bind(title)
        .bind(content)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    /// Delete a post. Returns whether a row was removed.
    #[instrument(skip_all, name = "clubhouse.repo.posts.delete", fields(post_id = %post_id))]
    pub async fn delete(pool: &PgPool, post_id: PostId) -> Result<bool, ClubhouseError> {
        let result = sqlx::query("DELETE FROM posts WHERE post_id = $1")
            .bind(post_id.as_uuid())
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
