//! Pub/sub broker client.
//!
//! # Connection Pattern
//!
//! The redis-rs `MultiplexedConnection` is cheap to clone and safe to use
//! concurrently, so each publish clones it rather than locking. The pub/sub
//! side needs a dedicated connection, opened from the kept `Client` by the
//! event relay task.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use thiserror::Error;
use tracing::{error, instrument, warn};

/// Broker failures. Every variant is a transport failure from the
/// publisher's point of view and is retried.
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    #[error("broker connection failed: {0}")]
    Connection(String),

    #[error("broker publish failed: {0}")]
    Publish(String),
}

/// Byte-oriented, channel-addressed publish.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), BrokerError>;
}

/// Redis-backed broker.
#[derive(Clone)]
pub struct RedisBroker {
    client: Client,
    connection: MultiplexedConnection,
}

impl RedisBroker {
    /// Open a client and a multiplexed connection.
    ///
    /// # Errors
    ///
    /// Returns `BrokerError::Connection` if the URL is invalid or the server
    /// is unreachable.
    pub async fn connect(redis_url: &str) -> Result<Self, BrokerError> {
        let client = Client::open(redis_url).map_err(|e| {
            // Do NOT log redis_url, it may contain credentials
            error!(target: "clubhouse.broker.redis", error = %e, "Failed to open Redis client");
            BrokerError::Connection(format!("Failed to open Redis client: {e}"))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!(target: "clubhouse.broker.redis", error = %e, "Failed to connect to Redis");
                BrokerError::Connection(format!("Failed to connect to Redis: {e}"))
            })?;

        Ok(Self { client, connection })
    }

    /// The underlying client, for opening pub/sub connections.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Broker for RedisBroker {
    #[instrument(skip_all, name = "clubhouse.broker.publish", fields(channel = %channel, bytes = payload.len()))]
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let mut conn = self.connection.clone();
        let receivers: i64 = conn.publish(channel, payload).await.map_err(|e| {
            warn!(target: "clubhouse.broker.redis", error = %e, channel = %channel, "PUBLISH failed");
            BrokerError::Publish(e.to_string())
        })?;
        tracing::trace!(target: "clubhouse.broker.redis", channel = %channel, receivers, "Published");
        Ok(())
    }
}

/// Mock broker for testing.
///
/// Records every successful publish and can be told to fail.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// A message accepted by [`MockBroker`].
    #[derive(Debug, Clone)]
    pub struct PublishedMessage {
        pub channel: String,
        pub payload: Vec<u8>,
    }

    impl PublishedMessage {
        /// Payload parsed as JSON (`Value::Null` if it is not JSON).
        pub fn json(&self) -> serde_json::Value {
            serde_json::from_slice(&self.payload).unwrap_or(serde_json::Value::Null)
        }
    }

    /// Mock broker for unit and integration tests.
    #[derive(Default)]
    pub struct MockBroker {
        /// Remaining calls that fail before calls start succeeding.
        failures_left: AtomicUsize,
        /// Fail every call.
        always_fail: bool,
        /// Delay applied before each call resolves.
        delay: Option<Duration>,
        call_count: AtomicUsize,
        published: Mutex<Vec<PublishedMessage>>,
    }

    impl MockBroker {
        /// A broker that accepts every publish.
        pub fn new() -> Self {
            Self::default()
        }

        /// A broker whose first `n` calls fail.
        pub fn failing_times(n: usize) -> Self {
            Self {
                failures_left: AtomicUsize::new(n),
                ..Self::default()
            }
        }

        /// A broker that fails every call.
        pub fn always_failing() -> Self {
            Self {
                always_fail: true,
                ..Self::default()
            }
        }

        /// Delay each call by `delay` before it resolves.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        /// Number of publish calls made, successful or not.
        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }

        /// Messages accepted so far, in publish order.
        pub fn published(&self) -> Vec<PublishedMessage> {
            self.published
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
        }

        /// Messages accepted on `channel`.
        pub fn published_on(&self, channel: &str) -> Vec<PublishedMessage> {
            self.published()
                .into_iter()
                .filter(|m| m.channel == channel)
                .collect()
        }
    }

    #[async_trait]
    impl Broker for MockBroker {
        async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), BrokerError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            if self.always_fail {
                return Err(BrokerError::Publish("mock broker failure".to_string()));
            }

            let failed = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                return Err(BrokerError::Publish("mock broker failure".to_string()));
            }

            self.published
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(PublishedMessage {
                    channel: channel.to_string(),
                    payload: payload.to_vec(),
                });
            Ok(())
        }
    }
}
