//! Event publishing.
//!
//! Every event is wrapped in an [`EventEnvelope`] and published as JSON on a
//! broker channel. Publishing is best-effort: with no broker configured it is
//! a successful no-op, and transport failures are retried a bounded number of
//! times before being returned.
//!
//! # Wire format
//!
//! ```json
//! { "type": "new_comment", "data": { ... }, "timestamp": "2024-05-01T12:00:00Z" }
//! ```

use crate::observability::metrics::{record_event_published, record_publish_attempt};
use crate::services::broker::{Broker, BrokerError};
use crate::services::scope::{FanoutScope, ScopeError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Total broker attempts per publish, including the first.
pub const MAX_PUBLISH_ATTEMPTS: u32 = 3;

/// Backoff unit. The pause after attempt `n` is `n * PUBLISH_BACKOFF_STEP`.
pub const PUBLISH_BACKOFF_STEP: Duration = Duration::from_millis(50);

/// Event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    NewPost,
    PostUpdated,
    PostDeleted,
    NewComment,
    CommentUpdated,
    CommentDeleted,
    ReactionAdded,
    ReactionRemoved,
    Mention,
}

impl EventType {
    pub const fn as_str(self) -> &'static str {
        match self {
            EventType::NewPost => "new_post",
            EventType::PostUpdated => "post_updated",
            EventType::PostDeleted => "post_deleted",
            EventType::NewComment => "new_comment",
            EventType::CommentUpdated => "comment_updated",
            EventType::CommentDeleted => "comment_deleted",
            EventType::ReactionAdded => "reaction_added",
            EventType::ReactionRemoved => "reaction_removed",
            EventType::Mention => "mention",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{type, data, timestamp}` wrapper around every published payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub data: T,
    pub timestamp: DateTime<Utc>,
}

impl<T> EventEnvelope<T> {
    pub fn new(event_type: EventType, data: T) -> Self {
        Self {
            event_type,
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Errors returned by [`EventPublisher::publish`].
#[derive(Debug, Error)]
pub enum PublishError {
    /// The payload could not be encoded. Never retried.
    #[error("event serialization failed: {0}")]
    Serialization(String),

    /// Every attempt failed; carries the last broker error.
    #[error("event transport failed after {attempts} attempts: {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: BrokerError,
    },

    #[error("event publish cancelled")]
    Cancelled,

    #[error("event publish deadline exceeded")]
    DeadlineExceeded,
}

impl From<ScopeError> for PublishError {
    fn from(err: ScopeError) -> Self {
        match err {
            ScopeError::Cancelled => PublishError::Cancelled,
            ScopeError::DeadlineExceeded => PublishError::DeadlineExceeded,
        }
    }
}

fn scope_outcome(err: ScopeError) -> &'static str {
    match err {
        ScopeError::Cancelled => "cancelled",
        ScopeError::DeadlineExceeded => "deadline_exceeded",
    }
}

/// Publishes event envelopes with bounded retry.
#[derive(Clone, Default)]
pub struct EventPublisher {
    broker: Option<Arc<dyn Broker>>,
}

impl EventPublisher {
    pub fn new(broker: Option<Arc<dyn Broker>>) -> Self {
        Self { broker }
    }

    /// A publisher with no broker. Every publish succeeds without sending.
    pub fn disabled() -> Self {
        Self { broker: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.broker.is_some()
    }

    /// Publish `payload` as a `event_type` event on `channel`.
    ///
    /// Up to [`MAX_PUBLISH_ATTEMPTS`] broker calls are made, pausing
    /// `attempt * 50ms` between them. The scope is checked before every
    /// attempt and every pause; once it ends the call returns its error
    /// without touching the broker again.
    #[instrument(skip_all, name = "clubhouse.events.publish", fields(channel = %channel, event_type = %event_type))]
    pub async fn publish<T: Serialize + ?Sized>(
        &self,
        scope: &FanoutScope,
        channel: &str,
        event_type: EventType,
        payload: &T,
    ) -> Result<(), PublishError> {
        let Some(broker) = &self.broker else {
            record_event_published(event_type.as_str(), "skipped");
            return Ok(());
        };

        let bytes = serde_json::to_vec(&EventEnvelope::new(event_type, payload)).map_err(|e| {
            tracing::error!(target: "clubhouse.services.events", error = %e, "Event serialization failed");
            record_event_published(event_type.as_str(), "error");
            PublishError::Serialization(e.to_string())
        })?;

        let mut attempt = 1;
        loop {
            let broker_error = match scope.run(broker.publish(channel, &bytes)).await {
                Ok(Ok(())) => {
                    record_publish_attempt("success");
                    record_event_published(event_type.as_str(), "success");
                    tracing::debug!(target: "clubhouse.services.events", attempt, "Event published");
                    return Ok(());
                }
                Ok(Err(e)) => {
                    record_publish_attempt("transport_error");
                    e
                }
                Err(scope_err) => {
                    record_publish_attempt(scope_outcome(scope_err));
                    record_event_published(event_type.as_str(), "error");
                    return Err(scope_err.into());
                }
            };

            tracing::warn!(
                target: "clubhouse.services.events",
                attempt,
                max_attempts = MAX_PUBLISH_ATTEMPTS,
                error = %broker_error,
                "Event publish attempt failed"
            );

            if attempt >= MAX_PUBLISH_ATTEMPTS {
                record_event_published(event_type.as_str(), "error");
                return Err(PublishError::Transport {
                    attempts: attempt,
                    source: broker_error,
                });
            }

            if let Err(scope_err) = scope.sleep(PUBLISH_BACKOFF_STEP * attempt).await {
                record_event_published(event_type.as_str(), "error");
                return Err(scope_err.into());
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::services::broker::mock::MockBroker;
    use serde::ser::Error as _;
    use tokio::time::Instant;

    fn publisher(broker: &Arc<MockBroker>) -> EventPublisher {
        EventPublisher::new(Some(broker.clone()))
    }

    fn scope() -> FanoutScope {
        FanoutScope::detached(Duration::from_secs(2))
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("refusing to serialize"))
        }
    }

    #[tokio::test]
    async fn test_disabled_publisher_is_noop_success() {
        let publisher = EventPublisher::disabled();
        let result = publisher
            .publish(&scope(), "post:1", EventType::NewComment, &serde_json::json!({}))
            .await;
        assert!(result.is_ok());
        assert!(!publisher.is_enabled());
    }

    #[tokio::test]
    async fn test_envelope_shape() {
        let broker = Arc::new(MockBroker::new());
        publisher(&broker)
            .publish(
                &scope(),
                "post:abc",
                EventType::NewComment,
                &serde_json::json!({"comment_id": "c1"}),
            )
            .await
            .unwrap();

        let sent = broker.published();
        assert_eq!(sent.len(), 1);
        let message = sent.first().unwrap();
        assert_eq!(message.channel, "post:abc");

        let json = message.json();
        assert_eq!(json["type"], "new_comment");
        assert_eq!(json["data"]["comment_id"], "c1");
        let ts = json["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_failures_then_success_takes_three_attempts() {
        let broker = Arc::new(MockBroker::failing_times(2));
        let start = Instant::now();

        let result = publisher(&broker)
            .publish(&scope(), "post:1", EventType::NewComment, &1u8)
            .await;

        assert!(result.is_ok());
        assert_eq!(broker.call_count(), 3);
        assert_eq!(broker.published().len(), 1);
        assert_eq!(start.elapsed(), Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_gives_up_after_three_attempts_and_150ms() {
        let broker = Arc::new(MockBroker::always_failing());
        let start = Instant::now();

        let result = publisher(&broker)
            .publish(&scope(), "post:1", EventType::NewComment, &1u8)
            .await;

        assert!(matches!(
            result,
            Err(PublishError::Transport { attempts: 3, .. })
        ));
        assert_eq!(broker.call_count(), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_serialization_error_is_not_retried() {
        let broker = Arc::new(MockBroker::new());

        let result = publisher(&broker)
            .publish(&scope(), "post:1", EventType::Mention, &Unserializable)
            .await;

        assert!(matches!(result, Err(PublishError::Serialization(_))));
        assert_eq!(broker.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_scope_returns_without_calling_broker() {
        let broker = Arc::new(MockBroker::new());
        let scope = scope();
        scope.cancel();

        let result = publisher(&broker)
            .publish(&scope, "post:1", EventType::NewComment, &1u8)
            .await;

        assert!(matches!(result, Err(PublishError::Cancelled)));
        assert_eq!(broker.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_between_retries_stops_retrying() {
        let broker = Arc::new(MockBroker::always_failing());
        let scope = scope();
        let canceller = scope.clone();
        tokio::spawn(async move {
            // First attempt fails at t=0, backoff ends at t=50ms
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = publisher(&broker)
            .publish(&scope, "post:1", EventType::NewComment, &1u8)
            .await;

        assert!(matches!(result, Err(PublishError::Cancelled)));
        assert_eq!(broker.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_during_backoff_is_reported() {
        let broker = Arc::new(MockBroker::always_failing());
        let scope = FanoutScope::detached(Duration::from_millis(120));

        let result = publisher(&broker)
            .publish(&scope, "post:1", EventType::NewComment, &1u8)
            .await;

        // attempt 1 at 0ms, attempt 2 at 50ms, deadline hits during the 100ms pause
        assert!(matches!(result, Err(PublishError::DeadlineExceeded)));
        assert_eq!(broker.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_broker_is_cut_off_by_deadline() {
        let broker = Arc::new(MockBroker::new().with_delay(Duration::from_secs(10)));
        let scope = FanoutScope::detached(Duration::from_millis(500));
        let start = Instant::now();

        let result = publisher(&broker)
            .publish(&scope, "post:1", EventType::NewComment, &1u8)
            .await;

        assert!(matches!(result, Err(PublishError::DeadlineExceeded)));
        assert_eq!(start.elapsed(), Duration::from_millis(500));
        assert!(broker.published().is_empty());
    }

    #[test]
    fn test_event_type_names_match_serde() {
        for event_type in [
            EventType::NewPost,
            EventType::PostUpdated,
            EventType::PostDeleted,
            EventType::NewComment,
            EventType::CommentUpdated,
            EventType::CommentDeleted,
            EventType::ReactionAdded,
            EventType::ReactionRemoved,
            EventType::Mention,
        ] {
            let json = serde_json::to_value(event_type).unwrap();
            assert_eq!(json, event_type.as_str());
        }
    }
}
