//! Identifier types for Clubhouse entities.
//!
//! Each identifier wraps a [`Uuid`] and renders as the bare hyphenated UUID,
//! which is the form used in channel names and JSON payloads.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// The wrapped UUID
            #[must_use]
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a user
    UserId
);

uuid_id!(
    /// Unique identifier for a post
    PostId
);

uuid_id!(
    /// Unique identifier for a comment
    CommentId
);

uuid_id!(
    /// Unique identifier for a section
    SectionId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_bare_uuid() {
        let raw = Uuid::new_v4();
        assert_eq!(PostId(raw).to_string(), raw.to_string());
    }

    #[test]
    fn test_serde_transparent() {
        let raw = Uuid::new_v4();
        let json = serde_json::to_string(&UserId(raw)).unwrap_or_default();
        assert_eq!(json, format!("\"{raw}\""));
    }

    #[test]
    fn test_new_ids_are_distinct() {
        assert_ne!(CommentId::new(), CommentId::new());
    }
}
