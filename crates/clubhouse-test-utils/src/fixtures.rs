//! Database fixtures.
//!
//! Users and sections are owned by other services in production; tests
//! insert them directly.

use common::types::{SectionId, UserId};
use sqlx::PgPool;

/// Insert a user and return its id.
pub async fn create_user(pool: &PgPool, username: &str) -> Result<UserId, sqlx::Error> {
    let user_id = UserId::new();
    sqlx::query("INSERT INTO users (user_id, username) VALUES ($1, $2)")
        .bind(user_id.as_uuid())
        .bind(username)
        .execute(pool)
        .await?;
    Ok(user_id)
}

/// Insert a user with a profile picture.
pub async fn create_user_with_picture(
    pool: &PgPool,
    username: &str,
    picture_url: &str,
) -> Result<UserId, sqlx::Error> {
    let user_id = UserId::new();
    sqlx::query("INSERT INTO users (user_id, username, profile_picture_url) VALUES ($1, $2, $3)")
        .bind(user_id.as_uuid())
        .bind(username)
        .bind(picture_url)
        .execute(pool)
        .await?;
    Ok(user_id)
}

/// Insert a section and return its id.
pub async fn create_section(pool: &PgPool, name: &str) -> Result<SectionId, sqlx::Error> {
    let section_id = SectionId::new();
    sqlx::query("INSERT INTO sections (section_id, name) VALUES ($1, $2)")
        .bind(section_id.as_uuid())
        .bind(name)
        .execute(pool)
        .await?;
    Ok(section_id)
}

/// Number of notifications stored for a user.
pub async fn count_notifications(pool: &PgPool, user_id: UserId) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = $1")
        .bind(user_id.as_uuid())
        .fetch_one(pool)
        .await
}
