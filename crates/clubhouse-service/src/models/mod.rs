//! Clubhouse models.
//!
//! Database rows, API request/response bodies and event payloads.

use chrono::{DateTime, Utc};
use common::types::{CommentId, PostId, SectionId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum post title length in characters.
pub const MAX_POST_TITLE_CHARS: usize = 200;

/// Maximum post content length in characters.
pub const MAX_POST_CONTENT_CHARS: usize = 10_000;

/// Maximum comment content length in characters.
pub const MAX_COMMENT_CONTENT_CHARS: usize = 5_000;

/// Maximum reaction emoji length in characters.
pub const MAX_EMOJI_CHARS: usize = 32;

/// Notifications returned per page.
pub const NOTIFICATION_PAGE_SIZE: i64 = 50;

// ============================================================================
// Operational
// ============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "healthy" or "unhealthy".
    pub status: String,

    pub instance_id: String,

    /// Database connectivity status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

/// Readiness check response.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    /// "ready" or "not_ready".
    pub status: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<&'static str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Users
// ============================================================================

/// Public user fields carried in events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
    pub profile_picture_url: Option<String>,
}

// ============================================================================
// Posts
// ============================================================================

/// Post database row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PostRow {
    pub post_id: Uuid,
    pub section_id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Post as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostResponse {
    pub id: PostId,
    pub section_id: SectionId,
    pub author_id: UserId,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PostRow> for PostResponse {
    fn from(row: PostRow) -> Self {
        Self {
            id: PostId(row.post_id),
            section_id: SectionId(row.section_id),
            author_id: UserId(row.author_id),
            title: row.title,
            content: row.content,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Body of `POST /api/v1/sections/:section_id/posts`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
}

impl CreatePostRequest {
    /// Validate the request.
    ///
    /// # Errors
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), &'static str> {
        validate_title(&self.title)?;
        validate_post_content(&self.content)
    }
}

fn validate_title(title: &str) -> Result<(), &'static str> {
    let len = title.trim().chars().count();
    if len == 0 {
        return Err("Title is required");
    }
    if len > MAX_POST_TITLE_CHARS {
        return Err("Title must be at most 200 characters");
    }
    Ok(())
}

fn validate_post_content(content: &str) -> Result<(), &'static str> {
    let len = content.trim().chars().count();
    if len == 0 {
        return Err("Content is required");
    }
    if len > MAX_POST_CONTENT_CHARS {
        return Err("Content must be at most 10000 characters");
    }
    Ok(())
}

/// Body of `PATCH /api/v1/posts/:id`. Absent fields are left unchanged.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePostRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl UpdatePostRequest {
    /// Validate the request.
    ///
    /// # Errors
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.title.is_none() && self.content.is_none() {
            return Err("Nothing to update");
        }
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(content) = &self.content {
            validate_post_content(content)?;
        }
        Ok(())
    }
}

// ============================================================================
// Comments
// ============================================================================

/// Comment database row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CommentRow {
    pub comment_id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub parent_comment_id: Option<Uuid>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Comment as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentResponse {
    pub id: CommentId,
    pub post_id: PostId,
    pub author_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_comment_id: Option<CommentId>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CommentRow> for CommentResponse {
    fn from(row: CommentRow) -> Self {
        Self {
            id: CommentId(row.comment_id),
            post_id: PostId(row.post_id),
            author_id: UserId(row.author_id),
            parent_comment_id: row.parent_comment_id.map(CommentId),
            content: row.content,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Body of `POST /api/v1/posts/:post_id/comments`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCommentRequest {
    pub content: String,
    #[serde(default)]
    pub parent_comment_id: Option<Uuid>,
}

impl CreateCommentRequest {
    /// Validate the request.
    ///
    /// # Errors
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), &'static str> {
        validate_comment_content(&self.content)
    }
}

/// Body of `PATCH /api/v1/comments/:id`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateCommentRequest {
    pub content: String,
}

impl UpdateCommentRequest {
    /// Validate the request.
    ///
    /// # Errors
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), &'static str> {
        validate_comment_content(&self.content)
    }
}

fn validate_comment_content(content: &str) -> Result<(), &'static str> {
    let len = content.trim().chars().count();
    if len == 0 {
        return Err("Content is required");
    }
    if len > MAX_COMMENT_CONTENT_CHARS {
        return Err("Content must be at most 5000 characters");
    }
    Ok(())
}

/// Validate a reaction emoji path segment.
///
/// # Errors
///
/// Returns an error message if validation fails.
pub fn validate_emoji(emoji: &str) -> Result<(), &'static str> {
    let len = emoji.chars().count();
    if len == 0 {
        return Err("Emoji is required");
    }
    if len > MAX_EMOJI_CHARS {
        return Err("Emoji must be at most 32 characters");
    }
    if emoji.chars().any(char::is_whitespace) {
        return Err("Emoji must not contain whitespace");
    }
    Ok(())
}

// ============================================================================
// Reactions
// ============================================================================

/// Reaction state after a PUT or DELETE.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionResponse {
    pub post_id: PostId,
    pub emoji: String,
    pub count: i64,
    /// Whether the caller's reaction is present after the call.
    pub reacted: bool,
}

// ============================================================================
// Notifications
// ============================================================================

/// Notification database row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NotificationRow {
    pub notification_id: Uuid,
    pub user_id: Uuid,
    pub actor_id: Uuid,
    pub kind: String,
    pub post_id: Option<Uuid>,
    pub comment_id: Option<Uuid>,
    pub excerpt: Option<String>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Notification as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationResponse {
    pub id: Uuid,
    pub kind: String,
    pub actor_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_id: Option<PostId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_id: Option<CommentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<NotificationRow> for NotificationResponse {
    fn from(row: NotificationRow) -> Self {
        Self {
            id: row.notification_id,
            kind: row.kind,
            actor_id: UserId(row.actor_id),
            post_id: row.post_id.map(PostId),
            comment_id: row.comment_id.map(CommentId),
            excerpt: row.excerpt,
            read: row.read_at.is_some(),
            created_at: row.created_at,
        }
    }
}

// ============================================================================
// Event payloads
// ============================================================================

/// `data` of a `mention` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionEventData {
    pub mentioned_user_id: UserId,
    pub mentioning_user_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mentioning_user: Option<UserSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_excerpt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_id: Option<PostId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_id: Option<CommentId>,
}

/// `data` of `post_deleted` and `comment_deleted` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedEventData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_id: Option<PostId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_id: Option<CommentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_id: Option<SectionId>,
}

/// `data` of `reaction_added` and `reaction_removed` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionEventData {
    pub post_id: PostId,
    pub user_id: UserId,
    pub emoji: String,
    pub count: i64,
}
