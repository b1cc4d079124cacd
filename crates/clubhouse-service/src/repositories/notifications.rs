//! Notifications repository.
//!
//! Mention notifications are written during fan-out and read back by the
//! mentioned user.

use crate::errors::ClubhouseError;
use crate::models::{NotificationRow, NOTIFICATION_PAGE_SIZE};
use crate::services::fanout::{MentionRecord, MentionRecorder};
use async_trait::async_trait;
use common::types::UserId;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

/// Notification kind for mentions.
pub const KIND_MENTION: &str = "mention";

/// Repository for notification operations.
pub struct NotificationsRepository;

impl NotificationsRepository {
    #[instrument(skip_all, name = "clubhouse.repo.notifications.insert_mention", fields(user_id = %record.mentioned_user_id))]
    pub async fn insert_mention(
        pool: &PgPool,
        record: &MentionRecord,
    ) -> Result<Uuid, ClubhouseError> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO notifications
                (notification_id, user_id, actor_id, kind, post_id, comment_id, excerpt)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING notification_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(record.mentioned_user_id.as_uuid())
        .bind(record.mentioning_user_id.as_uuid())
        .bind(KIND_MENTION)
        .bind(record.post_id.map(|id| id.as_uuid()))
        .bind(record.comment_id.map(|id| id.as_uuid()))
        .bind(record.excerpt.as_deref())
        .fetch_one(pool)
        .await?;

        Ok(id)
    }

    /// Most recent notifications for a user, newest first.
    #[instrument(skip_all, name = "clubhouse.repo.notifications.list_for_user", fields(user_id = %user_id))]
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: UserId,
    ) -> Result<Vec<NotificationRow>, ClubhouseError> {
        let rows: Vec<NotificationRow> = sqlx::query_as(
            r#"
            SELECT notification_id, user_id, actor_id, kind, post_id, comment_id,
                   excerpt, read_at, created_at
            FROM notifications
            WHERE user_id = $1
            ORDER BY created_at DESC, notification_id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(NOTIFICATION_PAGE_SIZE)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    /// Mark a notification read. Returns false if it does not belong to `user_id`.
    #[instrument(skip_all, name = "clubhouse.repo.notifications.mark_read", fields(user_id = %user_id))]
    pub async fn mark_read(
        pool: &PgPool,
        user_id: UserId,
        notification_id: Uuid,
    ) -> Result<bool, ClubhouseError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET read_at = COALESCE(read_at, NOW())
            WHERE notification_id = $1 AND user_id = $2
            "#,
        )
        .bind(notification_id)
        .bind(user_id.as_uuid())
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Postgres-backed [`MentionRecorder`].
#[derive(Clone)]
pub struct PgMentionRecorder {
    pool: PgPool,
}

impl PgMentionRecorder {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MentionRecorder for PgMentionRecorder {
    async fn record_mention(&self, record: &MentionRecord) -> Result<(), ClubhouseError> {
        NotificationsRepository::insert_mention(&self.pool, record).await?;
        Ok(())
    }
}
