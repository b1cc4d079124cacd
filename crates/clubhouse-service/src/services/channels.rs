//! Broker channel names.
//!
//! Every channel is `<namespace>:<uuid>`. The namespace tags keep names for
//! different entity kinds disjoint even when ids collide.

use std::fmt;
use uuid::Uuid;

/// Channel namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelPrefix {
    Post,
    Comment,
    Section,
    UserMentions,
}

impl ChannelPrefix {
    /// Namespace tag placed before the identifier.
    pub const fn tag(self) -> &'static str {
        match self {
            ChannelPrefix::Post => "post",
            ChannelPrefix::Comment => "comment",
            ChannelPrefix::Section => "section",
            ChannelPrefix::UserMentions => "user_mentions",
        }
    }

    /// Broker pattern matching every channel in this namespace.
    pub fn pattern(self) -> String {
        format!("{}:*", self.tag())
    }

    /// Inverse of [`format_channel`]: the id of a channel in this namespace.
    pub fn parse_id(self, channel: &str) -> Option<Uuid> {
        channel
            .strip_prefix(self.tag())
            .and_then(|rest| rest.strip_prefix(':'))
            .and_then(|id| Uuid::parse_str(id).ok())
    }
}

impl fmt::Display for ChannelPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Format the channel name for an entity.
pub fn format_channel(prefix: ChannelPrefix, id: impl fmt::Display) -> String {
    format!("{}:{}", prefix.tag(), id)
}
