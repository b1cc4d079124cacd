//! HTTP request handlers for the Clubhouse service.

pub mod comments;
pub mod health;
pub mod metrics;
pub mod notifications;
pub mod posts;
pub mod reactions;

pub use comments::{create_comment, delete_comment, list_comments, update_comment};
pub use health::{health_check, readiness_check};
pub use metrics::metrics_handler;
pub use notifications::{list_notifications, mark_notification_read};
pub use posts::{create_post, delete_post, get_post, update_post};
pub use reactions::{add_reaction, remove_reaction};

use crate::errors::ClubhouseError;
use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;

/// `Json<T>` whose rejections render as [`ClubhouseError`].
///
/// A missing JSON content type answers 415; a body that does not decode
/// answers 400 `VALIDATION_FAILED` instead of axum's 422.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ClubhouseError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{body::Body, http::header};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Payload {
        content: String,
    }

    fn request(content_type: Option<&str>, body: &'static str) -> Request {
        let mut builder = axum::http::Request::builder().method("POST").uri("/");
        if let Some(value) = content_type {
            builder = builder.header(header::CONTENT_TYPE, value);
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn test_json_body_decodes() {
        let JsonBody(payload) = JsonBody::<Payload>::from_request(
            request(Some("application/json"), r#"{"content":"hi @alice"}"#),
            &(),
        )
        .await
        .unwrap();

        assert_eq!(payload.content, "hi @alice");
    }

    #[tokio::test]
    async fn test_missing_content_type_is_unsupported_media_type() {
        let err = JsonBody::<Payload>::from_request(request(None, r#"{"content":"hi"}"#), &())
            .await
            .unwrap_err();

        assert!(matches!(err, ClubhouseError::UnsupportedMediaType(_)));
        assert_eq!(err.status_code(), 415);
    }

    #[tokio::test]
    async fn test_wrong_content_type_is_unsupported_media_type() {
        let err = JsonBody::<Payload>::from_request(
            request(Some("text/plain"), r#"{"content":"hi"}"#),
            &(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.status_code(), 415);
    }

    #[tokio::test]
    async fn test_undecodable_body_is_validation_error() {
        for body in ["{not json", r#"{"text":"missing content"}"#] {
            let err = JsonBody::<Payload>::from_request(request(Some("application/json"), body), &())
                .await
                .unwrap_err();

            assert!(matches!(err, ClubhouseError::Validation(_)), "{body}");
            assert_eq!(err.kind().1, "VALIDATION_FAILED");
        }
    }
}
