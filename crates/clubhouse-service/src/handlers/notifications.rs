//! Notification handlers.
//!
//! - `GET /api/v1/notifications` - Caller's notifications, newest first
//! - `POST /api/v1/notifications/{id}/read` - Mark one read

use crate::auth::AuthenticatedUser;
use crate::errors::ClubhouseError;
use crate::models::NotificationResponse;
use crate::repositories::NotificationsRepository;
use crate::routes::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Handler for GET /api/v1/notifications
#[instrument(skip_all, name = "clubhouse.handlers.list_notifications")]
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<NotificationResponse>>, ClubhouseError> {
    let rows = NotificationsRepository::list_for_user(&state.pool, user.user_id).await?;
    Ok(Json(
        rows.into_iter().map(NotificationResponse::from).collect(),
    ))
}

/// Handler for POST /api/v1/notifications/{id}/read
///
/// Another user's notification is reported as not found.
#[instrument(skip_all, name = "clubhouse.handlers.mark_notification_read")]
pub async fn mark_notification_read(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(notification_id): Path<Uuid>,
) -> Result<StatusCode, ClubhouseError> {
    if NotificationsRepository::mark_read(&state.pool, user.user_id, notification_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ClubhouseError::NotFound(
            "Notification not found".to_string(),
        ))
    }
}
