//! Users repository.
//!
//! Read-only access to user records. Account creation lives outside this
//! service; fan-out only needs to turn usernames into ids and attach a small
//! author summary to mention events.

use crate::errors::ClubhouseError;
use crate::models::UserSummary;
use crate::services::mentions::{LookupError, UserLookup};
use async_trait::async_trait;
use common::types::UserId;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

/// Repository for user lookups.
pub struct UsersRepository;

impl UsersRepository {
    /// Find a user by username, ignoring case.
    #[instrument(skip_all, name = "clubhouse.repo.users.find_by_username")]
    pub async fn find_by_username(
        pool: &PgPool,
        username: &str,
    ) -> Result<Option<UserSummary>, ClubhouseError> {
        let row: Option<UserSummaryRow> = sqlx::query_as(
            r#"
            SELECT user_id, username, profile_picture_url
            FROM users
            WHERE lower(username) = lower($1)
            "#,
        )
        .bind(username)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(UserSummary::from))
    }

    /// Find a user summary by id.
    #[instrument(skip_all, name = "clubhouse.repo.users.find_summary", fields(user_id = %user_id))]
    pub async fn find_summary(
        pool: &PgPool,
        user_id: UserId,
    ) -> Result<Option<UserSummary>, ClubhouseError> {
        let row: Option<UserSummaryRow> = sqlx::query_as(
            r#"
            SELECT user_id, username, profile_picture_url
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(pool)
        .await?;

        Ok(row.map(UserSummary::from))
    }
}

/// Postgres-backed [`UserLookup`] for the mention resolver.
#[derive(Clone)]
pub struct PgUserLookup {
    pool: PgPool,
}

impl PgUserLookup {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserLookup for PgUserLookup {
    async fn lookup_user_by_username(&self, username: &str) -> Result<UserSummary, LookupError> {
        match UsersRepository::find_by_username(&self.pool, username).await {
            Ok(Some(user)) => Ok(user),
            Ok(None) => Err(LookupError::NotFound),
            Err(e) => Err(LookupError::Backend(e.to_string())),
        }
    }

    async fn lookup_user_by_id(&self, user_id: UserId) -> Result<UserSummary, LookupError> {
        match UsersRepository::find_summary(&self.pool, user_id).await {
            Ok(Some(user)) => Ok(user),
            Ok(None) => Err(LookupError::NotFound),
            Err(e) => Err(LookupError::Backend(e.to_string())),
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserSummaryRow {
    user_id: Uuid,
    username: String,
    profile_picture_url: Option<String>,
}

impl From<UserSummaryRow> for UserSummary {
    fn from(row: UserSummaryRow) -> Self {
        Self {
            id: UserId(row.user_id),
            username: row.username,
            profile_picture_url: row.profile_picture_url,
        }
    }
}
