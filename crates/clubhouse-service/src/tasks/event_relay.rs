//! Event relay background task.
//!
//! Pattern-subscribes to every `user_mentions:<id>` channel and forwards each
//! message, unchanged, as a text frame to that user's live WebSocket, if any.
//! Users without a connection simply miss the event; the persisted
//! notification is their record.
//!
//! # Scope
//!
//! Only `user_mentions:*` is relayed. Events on `section:*`, `post:*` and
//! `comment:*` are published for external subscribers; no connection held
//! by this process receives them.
//!
//! # Graceful Shutdown
//!
//! The task exits when the cancellation token is triggered. A dropped broker
//! connection is re-established after a short pause.

use crate::services::channels::ChannelPrefix;
use crate::ws::ConnectionRegistry;
use common::error::ClubhouseCommonError;
use common::types::UserId;
use futures::StreamExt;
use redis::Client;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Pause before re-subscribing after the broker connection drops.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Deliver one broker message. Returns true if a connection accepted it.
pub fn route_message(registry: &ConnectionRegistry, channel: &str, payload: &str) -> bool {
    let Some(user_id) = ChannelPrefix::UserMentions.parse_id(channel) else {
        tracing::debug!(target: "clubhouse.task.event_relay", channel = %channel, "Ignoring unroutable channel");
        return false;
    };
    registry.send_text(UserId(user_id), payload)
}

/// Start the event relay task.
///
/// Returns when the cancellation token is triggered.
#[instrument(skip_all, name = "clubhouse.task.event_relay")]
pub async fn start_event_relay(
    client: Client,
    registry: ConnectionRegistry,
    cancel_token: CancellationToken,
) {
    info!(target: "clubhouse.task.event_relay", "Starting event relay task");

    loop {
        tokio::select! {
            result = relay_until_disconnect(&client, &registry) => {
                if let Err(e) = result {
                    warn!(
                        target: "clubhouse.task.event_relay",
                        error = %e,
                        "Event relay subscription lost, reconnecting"
                    );
                }
            }
            _ = cancel_token.cancelled() => break,
        }

        tokio::select! {
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            _ = cancel_token.cancelled() => break,
        }
    }

    info!(
        target: "clubhouse.task.event_relay",
        "Event relay task received shutdown signal, exiting"
    );
}

async fn relay_until_disconnect(
    client: &Client,
    registry: &ConnectionRegistry,
) -> Result<(), ClubhouseCommonError> {
    let mut pubsub = client
        .get_async_pubsub()
        .await
        .map_err(|e| ClubhouseCommonError::Broker(format!("pubsub connect failed: {e}")))?;

    let pattern = ChannelPrefix::UserMentions.pattern();
    pubsub
        .psubscribe(&pattern)
        .await
        .map_err(|e| ClubhouseCommonError::Broker(format!("psubscribe failed: {e}")))?;

    tracing::debug!(target: "clubhouse.task.event_relay", pattern = %pattern, "Subscribed");

    let mut messages = pubsub.on_message();
    while let Some(msg) = messages.next().await {
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(target: "clubhouse.task.event_relay", error = %e, "Undecodable payload");
                continue;
            }
        };
        let delivered = route_message(registry, msg.get_channel_name(), &payload);
        tracing::trace!(target: "clubhouse.task.event_relay", delivered, "Relayed event");
    }

    Err(ClubhouseCommonError::Broker(
        "pubsub stream ended".to_string(),
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::services::channels::format_channel;
    use crate::ws::ConnectionHandle;
    use axum::extract::ws::Message;
    use tokio::sync::mpsc;

    #[test]
    fn test_routes_to_connected_user() {
        let registry = ConnectionRegistry::new();
        let user = UserId::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _guard = registry.register(user, ConnectionHandle::new(None, tx));

        let channel = format_channel(ChannelPrefix::UserMentions, user);
        assert!(route_message(&registry, &channel, r#"{"type":"mention"}"#));

        assert!(matches!(
            rx.try_recv().unwrap(),
            Message::Text(text) if text == r#"{"type":"mention"}"#
        ));
    }

    #[test]
    fn test_offline_user_is_dropped() {
        let registry = ConnectionRegistry::new();
        let channel = format_channel(ChannelPrefix::UserMentions, UserId::new());
        assert!(!route_message(&registry, &channel, "{}"));
    }

    #[test]
    fn test_other_namespaces_are_ignored() {
        let registry = ConnectionRegistry::new();
        let user = UserId::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _guard = registry.register(user, ConnectionHandle::new(None, tx));

        for prefix in [ChannelPrefix::Section, ChannelPrefix::Post, ChannelPrefix::Comment] {
            let channel = format_channel(prefix, user);
            assert!(!route_message(&registry, &channel, "{}"), "{channel}");
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_subscribes_to_mention_channels_only() {
        let pattern = ChannelPrefix::UserMentions.pattern();
        assert_eq!(pattern, "user_mentions:*");

        let post_channel = format_channel(ChannelPrefix::Post, UserId::new());
        assert!(!post_channel.starts_with(pattern.trim_end_matches('*')));
    }
}
