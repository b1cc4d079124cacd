//! Repository layer for the Clubhouse service.
//!
//! Provides database access patterns following the Handler -> Service -> Repository
//! architecture. All queries are parameterized.

pub mod comments;
pub mod notifications;
pub mod posts;
pub mod reactions;
pub mod users;

pub use comments::CommentsRepository;
pub use notifications::{NotificationsRepository, PgMentionRecorder};
pub use posts::PostsRepository;
pub use reactions::ReactionsRepository;
pub use users::{PgUserLookup, UsersRepository};
