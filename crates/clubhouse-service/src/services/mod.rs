//! Service layer for the Clubhouse service.
//!
//! # Components
//!
//! - `broker` - Pub/sub transport (Redis) behind the `Broker` trait
//! - `channels` - Channel naming
//! - `events` - Event envelopes and the retrying publisher
//! - `fanout` - Post-write orchestration of events and mentions
//! - `mentions` - Mention extraction and resolution
//! - `scope` - Cancellation and deadline for background work

pub mod broker;
pub mod channels;
pub mod events;
pub mod fanout;
pub mod mentions;
pub mod scope;

pub use broker::{Broker, BrokerError, RedisBroker};
pub use channels::{format_channel, ChannelPrefix};
pub use events::{EventEnvelope, EventPublisher, EventType, PublishError};
pub use fanout::{
    added_mentions, FanoutJob, FanoutOutcome, FanoutService, MentionRecord, MentionRecorder,
};
pub use mentions::{extract_mentions, truncate_excerpt, LookupError, MentionResolver, UserLookup};
pub use scope::{FanoutScope, ScopeError};
