//! `@username` mentions.
//!
//! Extraction is a pure scan over the content. Resolution maps the
//! candidates to user ids through a [`UserLookup`] collaborator.

use crate::models::UserSummary;
use async_trait::async_trait;
use common::types::UserId;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Shortest accepted username, in characters.
pub const MIN_USERNAME_CHARS: usize = 3;

/// Longest accepted username, in characters.
pub const MAX_USERNAME_CHARS: usize = 50;

/// Longest mention excerpt, in characters.
pub const MAX_EXCERPT_CHARS: usize = 100;

/// Errors from a user lookup.
#[derive(Debug, Error)]
pub enum LookupError {
    /// No user has this username. Resolution skips it.
    #[error("user not found")]
    NotFound,

    /// The lookup itself failed. Resolution aborts.
    #[error("user lookup failed: {0}")]
    Backend(String),
}

/// Looks users up by username.
#[async_trait]
pub trait UserLookup: Send + Sync {
    async fn lookup_user_by_username(&self, username: &str) -> Result<UserSummary, LookupError>;

    /// Summary of a known user, attached to mention events as the author.
    async fn lookup_user_by_id(&self, _user_id: UserId) -> Result<UserSummary, LookupError> {
        Err(LookupError::NotFound)
    }
}

/// Letters (any script), digits and underscore.
pub fn is_username_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// True when `candidate` has an accepted length and only username characters.
pub fn is_valid_username(candidate: &str) -> bool {
    let len = candidate.chars().count();
    (MIN_USERNAME_CHARS..=MAX_USERNAME_CHARS).contains(&len)
        && candidate.chars().all(is_username_char)
}

/// Extract mentioned usernames from free text.
///
/// An `@` starts a mention unless the character before it is a backslash,
/// another `@`, or a username character. The run of username characters
/// after it is kept only if its length is within bounds; runs that are too
/// short or too long are dropped, never truncated. Duplicates (exact match)
/// are dropped, keeping first-occurrence order.
pub fn extract_mentions(content: &str) -> Vec<String> {
    let chars: Vec<char> = content.chars().collect();
    let mut seen = HashSet::new();
    let mut mentions = Vec::new();

    let mut i = 0;
    while i < chars.len() {
        if chars.get(i) != Some(&'@') {
            i += 1;
            continue;
        }

        let blocked = i
            .checked_sub(1)
            .and_then(|prev| chars.get(prev))
            .is_some_and(|&p| p == '\\' || p == '@' || is_username_char(p));

        let start = i + 1;
        let mut end = start;
        while chars.get(end).is_some_and(|&c| is_username_char(c)) {
            end += 1;
        }

        let len = end - start;
        if !blocked && (MIN_USERNAME_CHARS..=MAX_USERNAME_CHARS).contains(&len) {
            let username: String = chars.get(start..end).unwrap_or_default().iter().collect();
            if seen.insert(username.clone()) {
                mentions.push(username);
            }
        }

        i = end.max(i + 1);
    }

    mentions
}

/// Trim `text` and cap it at [`MAX_EXCERPT_CHARS`] characters.
///
/// Returns `None` when nothing is left after trimming.
pub fn truncate_excerpt(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_EXCERPT_CHARS).collect())
}

/// Resolves mention candidates to user ids.
///
/// Without a lookup collaborator every resolution is empty, which is how
/// mentions are switched off.
#[derive(Clone, Default)]
pub struct MentionResolver {
    lookup: Option<Arc<dyn UserLookup>>,
}

impl MentionResolver {
    pub fn new(lookup: Option<Arc<dyn UserLookup>>) -> Self {
        Self { lookup }
    }

    /// A resolver that never resolves anything.
    pub fn disabled() -> Self {
        Self { lookup: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.lookup.is_some()
    }

    /// Resolve `candidates` to the ids of the users they name.
    ///
    /// Candidates are trimmed, re-validated and deduplicated ignoring case
    /// (first spelling wins). Unknown usernames and the author are left out.
    /// Any lookup failure other than not-found aborts the whole batch.
    #[instrument(skip_all, name = "clubhouse.mentions.resolve", fields(candidates = candidates.len()))]
    pub async fn resolve(
        &self,
        candidates: &[String],
        author_id: UserId,
    ) -> Result<Vec<UserId>, LookupError> {
        let Some(lookup) = &self.lookup else {
            return Ok(Vec::new());
        };

        let mut resolved = Vec::new();
        for username in normalize_candidates(candidates) {
            match lookup.lookup_user_by_username(&username).await {
                Ok(user) if user.id == author_id => {
                    tracing::trace!(target: "clubhouse.services.mentions", "Skipping self-mention");
                }
                Ok(user) => {
                    if !resolved.contains(&user.id) {
                        resolved.push(user.id);
                    }
                }
                Err(LookupError::NotFound) => {
                    tracing::trace!(target: "clubhouse.services.mentions", "Mentioned user does not exist");
                }
                Err(e) => {
                    tracing::warn!(
                        target: "clubhouse.services.mentions",
                        error = %e,
                        "User lookup failed, aborting mention resolution"
                    );
                    return Err(e);
                }
            }
        }

        Ok(resolved)
    }

    /// The author's public summary, or `None` if it cannot be found.
    pub async fn author_summary(&self, author_id: UserId) -> Option<UserSummary> {
        let lookup = self.lookup.as_ref()?;
        match lookup.lookup_user_by_id(author_id).await {
            Ok(user) => Some(user),
            Err(LookupError::NotFound) => None,
            Err(e) => {
                tracing::debug!(target: "clubhouse.services.mentions", error = %e, "Author summary unavailable");
                None
            }
        }
    }
}

fn normalize_candidates(candidates: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    candidates
        .iter()
        .map(|c| c.trim())
        .filter(|c| is_valid_username(c))
        .filter(|c| seen.insert(c.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// Mock user lookup for testing.
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// In-memory user table keyed by lowercased username.
    #[derive(Default)]
    pub struct MockUserLookup {
        users: HashMap<String, UserSummary>,
        fail: AtomicBool,
        call_count: AtomicUsize,
    }

    impl MockUserLookup {
        pub fn new() -> Self {
            Self::default()
        }

        /// Add a user with a fresh id.
        pub fn with_user(mut self, username: &str) -> Self {
            self.users.insert(
                username.to_lowercase(),
                UserSummary {
                    id: UserId::new(),
                    username: username.to_string(),
                    profile_picture_url: None,
                },
            );
            self
        }

        /// Make every lookup fail with a backend error.
        pub fn set_failing(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        /// Id of a user added with [`MockUserLookup::with_user`].
        pub fn id_of(&self, username: &str) -> Option<UserId> {
            self.users.get(&username.to_lowercase()).map(|u| u.id)
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl UserLookup for MockUserLookup {
        async fn lookup_user_by_username(&self, username: &str) -> Result<UserSummary, LookupError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(LookupError::Backend("mock lookup failure".to_string()));
            }
            self.users
                .get(&username.to_lowercase())
                .cloned()
                .ok_or(LookupError::NotFound)
        }

        async fn lookup_user_by_id(&self, user_id: UserId) -> Result<UserSummary, LookupError> {
            self.users
                .values()
                .find(|u| u.id == user_id)
                .cloned()
                .ok_or(LookupError::NotFound)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    // -------------------------------------------------------------------------
    // extract_mentions
    // -------------------------------------------------------------------------

    #[test]
    fn test_extract_skips_short_names() {
        assert_eq!(extract_mentions("Hello @ab @alice @bob!"), vec!["alice", "bob"]);
    }

    #[test]
    fn test_extract_ignores_email_addresses() {
        assert!(extract_mentions("email@example.com").is_empty());
    }

    #[test]
    fn test_extract_honours_escape() {
        assert!(extract_mentions("ping \\@alice").is_empty());
    }

    #[test]
    fn test_extract_ignores_double_at() {
        assert!(extract_mentions("@@alice").is_empty());
    }

    #[test]
    fn test_extract_edge_inputs() {
        assert!(extract_mentions("").is_empty());
        assert!(extract_mentions("trailing @").is_empty());
        assert!(extract_mentions("@ab @x").is_empty());
    }

    #[test]
    fn test_extract_skips_overlong_names_entirely() {
        let long = "a".repeat(51);
        let exact = "b".repeat(50);
        let content = format!("@{long} @{exact}");
        assert_eq!(extract_mentions(&content), vec![exact]);
    }

    #[test]
    fn test_extract_dedup_is_case_sensitive_and_ordered() {
        assert_eq!(
            extract_mentions("@carol @Alice @carol @alice"),
            vec!["carol", "Alice", "alice"]
        );
    }

    #[test]
    fn test_extract_unicode_names() {
        assert_eq!(extract_mentions("hi @zoë_92, @日本語"), vec!["zoë_92", "日本語"]);
    }

    #[test]
    fn test_extract_stops_at_punctuation() {
        assert_eq!(extract_mentions("(@alice)."), vec!["alice"]);
        assert_eq!(extract_mentions("@alice-bob"), vec!["alice"]);
    }

    #[test]
    fn test_extract_results_are_always_valid() {
        let inputs = [
            "a@b @c @dddd \\@eeee @@ffff @gg_gg @hhhh@iiii",
            "@_x_ @___ @a1b2c3 x@yyy",
            "@ñandú @ÅÅÅ @1234567890",
        ];
        for input in inputs {
            let found = extract_mentions(input);
            let unique: HashSet<&String> = found.iter().collect();
            assert_eq!(unique.len(), found.len(), "duplicates in {input:?}");
            for name in &found {
                assert!(is_valid_username(name), "{name:?} from {input:?}");
            }
        }
    }

    // -------------------------------------------------------------------------
    // truncate_excerpt
    // -------------------------------------------------------------------------

    #[test]
    fn test_excerpt_empty_is_none() {
        assert_eq!(truncate_excerpt(""), None);
        assert_eq!(truncate_excerpt("   \n\t"), None);
    }

    #[test]
    fn test_excerpt_trims() {
        assert_eq!(truncate_excerpt("  hello  ").as_deref(), Some("hello"));
    }

    #[test]
    fn test_excerpt_counts_characters_not_bytes() {
        let text: String = "é".repeat(150);
        let excerpt = truncate_excerpt(&text).unwrap();
        assert_eq!(excerpt.chars().count(), 100);
        assert_eq!(excerpt.len(), 200);
        assert!(text.starts_with(&excerpt));
    }

    #[test]
    fn test_excerpt_short_text_untouched() {
        assert_eq!(truncate_excerpt("short").as_deref(), Some("short"));
    }

    // -------------------------------------------------------------------------
    // MentionResolver
    // -------------------------------------------------------------------------

    struct TableLookup {
        users: HashMap<String, UserId>,
        broken: Option<String>,
        calls: Mutex<Vec<String>>,
    }

    impl TableLookup {
        fn new(names: &[&str]) -> (Self, HashMap<String, UserId>) {
            let users: HashMap<String, UserId> = names
                .iter()
                .map(|n| (n.to_lowercase(), UserId::new()))
                .collect();
            (
                Self {
                    users: users.clone(),
                    broken: None,
                    calls: Mutex::new(Vec::new()),
                },
                users,
            )
        }
    }

    #[async_trait]
    impl UserLookup for TableLookup {
        async fn lookup_user_by_username(&self, username: &str) -> Result<UserSummary, LookupError> {
            self.calls.lock().unwrap().push(username.to_string());
            if self.broken.as_deref() == Some(username) {
                return Err(LookupError::Backend("connection reset".to_string()));
            }
            self.users
                .get(&username.to_lowercase())
                .map(|id| UserSummary {
                    id: *id,
                    username: username.to_string(),
                    profile_picture_url: None,
                })
                .ok_or(LookupError::NotFound)
        }
    }

    fn id_of(ids: &HashMap<String, UserId>, name: &str) -> UserId {
        ids.get(name).copied().unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_resolve_without_lookup_is_empty() {
        let resolver = MentionResolver::disabled();
        let out = resolver
            .resolve(&names(&["alice"]), UserId::new())
            .await
            .unwrap();
        assert!(out.is_empty());
        assert!(!resolver.is_enabled());
    }

    #[tokio::test]
    async fn test_resolve_skips_unknown_and_self() {
        let (lookup, ids) = TableLookup::new(&["alice", "bob", "carol"]);
        let resolver = MentionResolver::new(Some(Arc::new(lookup)));
        let author = id_of(&ids, "bob");

        let out = resolver
            .resolve(&names(&["alice", "ghost", "bob", "carol"]), author)
            .await
            .unwrap();

        assert_eq!(out, vec![id_of(&ids, "alice"), id_of(&ids, "carol")]);
    }

    #[tokio::test]
    async fn test_resolve_dedups_case_insensitively_keeping_first_spelling() {
        let (lookup, ids) = TableLookup::new(&["alice"]);
        let lookup = Arc::new(lookup);
        let resolver = MentionResolver::new(Some(lookup.clone()));

        let out = resolver
            .resolve(&names(&["  Alice ", "alice", "ALICE"]), UserId::new())
            .await
            .unwrap();

        assert_eq!(out, vec![id_of(&ids, "alice")]);
        assert_eq!(*lookup.calls.lock().unwrap(), vec!["Alice".to_string()]);
    }

    #[tokio::test]
    async fn test_resolve_revalidates_candidates() {
        let (lookup, _) = TableLookup::new(&["ab", "has space", "ok_name"]);
        let lookup = Arc::new(lookup);
        let resolver = MentionResolver::new(Some(lookup.clone()));

        let out = resolver
            .resolve(&names(&["ab", "has space", "ok_name", ""]), UserId::new())
            .await
            .unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(*lookup.calls.lock().unwrap(), vec!["ok_name".to_string()]);
    }

    #[tokio::test]
    async fn test_resolve_fails_fast_on_backend_error() {
        let (mut lookup, _) = TableLookup::new(&["alice", "carol"]);
        lookup.broken = Some("bob".to_string());
        let lookup = Arc::new(lookup);
        let resolver = MentionResolver::new(Some(lookup.clone()));

        let result = resolver
            .resolve(&names(&["alice", "bob", "carol"]), UserId::new())
            .await;

        assert!(matches!(result, Err(LookupError::Backend(_))));
        // carol is never looked up
        assert_eq!(lookup.calls.lock().unwrap().len(), 2);
    }
}
