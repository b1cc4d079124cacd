//! Post-write fan-out.
//!
//! After a write commits, the handler hands a [`FanoutJob`] to
//! [`FanoutService::dispatch`] and returns. The job runs on its own task
//! under a [`FanoutScope`] (child of the shutdown token, bounded by the
//! configured timeout), so slow brokers or lookups never hold up the HTTP
//! response.
//!
//! Per job the order is fixed:
//! 1. entity events on the entity's channel(s)
//! 2. mention extraction and resolution (author excluded). Edits only
//!    resolve usernames that were not already in the previous content.
//! 3. per mentioned user: record the notification, then publish `mention`
//!    on `user_mentions:<id>`
//!
//! Nothing here fails the write. Every failure is logged and counted in the
//! returned [`FanoutOutcome`].

use crate::errors::ClubhouseError;
use crate::models::{
    CommentResponse, DeletedEventData, MentionEventData, PostResponse, ReactionEventData,
    UserSummary,
};
use crate::observability::metrics::{record_fanout, record_mentions_resolved};
use crate::services::channels::{format_channel, ChannelPrefix};
use crate::services::events::{EventPublisher, EventType};
use crate::services::mentions::{extract_mentions, truncate_excerpt, MentionResolver};
use crate::services::scope::FanoutScope;
use async_trait::async_trait;
use common::types::{CommentId, PostId, SectionId, UserId};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, Instrument};

/// A mention to persist as a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionRecord {
    pub mentioned_user_id: UserId,
    pub mentioning_user_id: UserId,
    pub post_id: Option<PostId>,
    pub comment_id: Option<CommentId>,
    pub excerpt: Option<String>,
}

/// Persists mention notifications.
#[async_trait]
pub trait MentionRecorder: Send + Sync {
    async fn record_mention(&self, record: &MentionRecord) -> Result<(), ClubhouseError>;
}

/// A committed write whose side effects still need to go out.
#[derive(Debug, Clone)]
pub enum FanoutJob {
    PostCreated(PostResponse),
    PostUpdated {
        post: PostResponse,
        previous_content: String,
    },
    PostDeleted {
        post_id: PostId,
        section_id: SectionId,
        author_id: UserId,
    },
    CommentCreated(CommentResponse),
    CommentUpdated {
        comment: CommentResponse,
        previous_content: String,
    },
    CommentDeleted {
        comment_id: CommentId,
        post_id: PostId,
        author_id: UserId,
    },
    ReactionAdded(ReactionEventData),
    ReactionRemoved(ReactionEventData),
}

/// Mention-bearing content of a job.
struct MentionSource<'a> {
    author_id: UserId,
    content: &'a str,
    /// Content before an edit; its mentions were already notified.
    previous_content: Option<&'a str>,
    post_id: PostId,
    comment_id: Option<CommentId>,
}

impl<'a> MentionSource<'a> {
    fn post(post: &'a PostResponse, previous_content: Option<&'a str>) -> Self {
        Self {
            author_id: post.author_id,
            content: &post.content,
            previous_content,
            post_id: post.id,
            comment_id: None,
        }
    }

    fn comment(comment: &'a CommentResponse, previous_content: Option<&'a str>) -> Self {
        Self {
            author_id: comment.author_id,
            content: &comment.content,
            previous_content,
            post_id: comment.post_id,
            comment_id: Some(comment.id),
        }
    }
}

/// Mentions in `content` that are not in `previous`, compared case-insensitively.
pub fn added_mentions(content: &str, previous: &str) -> Vec<String> {
    let notified: HashSet<String> = extract_mentions(previous)
        .iter()
        .map(|u| u.to_lowercase())
        .collect();
    extract_mentions(content)
        .into_iter()
        .filter(|u| !notified.contains(&u.to_lowercase()))
        .collect()
}

impl FanoutJob {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            FanoutJob::PostCreated(_) => "post_created",
            FanoutJob::PostUpdated { .. } => "post_updated",
            FanoutJob::PostDeleted { .. } => "post_deleted",
            FanoutJob::CommentCreated(_) => "comment_created",
            FanoutJob::CommentUpdated { .. } => "comment_updated",
            FanoutJob::CommentDeleted { .. } => "comment_deleted",
            FanoutJob::ReactionAdded(_) => "reaction_added",
            FanoutJob::ReactionRemoved(_) => "reaction_removed",
        }
    }

    fn mention_source(&self) -> Option<MentionSource<'_>> {
        match self {
            FanoutJob::PostCreated(post) => Some(MentionSource::post(post, None)),
            FanoutJob::PostUpdated {
                post,
                previous_content,
            } => Some(MentionSource::post(post, Some(previous_content.as_str()))),
            FanoutJob::CommentCreated(comment) => Some(MentionSource::comment(comment, None)),
            FanoutJob::CommentUpdated {
                comment,
                previous_content,
            } => Some(MentionSource::comment(comment, Some(previous_content.as_str()))),
            _ => None,
        }
    }
}

/// What a fan-out run achieved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutOutcome {
    /// Events accepted by the publisher (entity and mention).
    pub events_published: usize,
    /// Events that failed after retries, or were cut off by the scope.
    pub events_failed: usize,
    /// Distinct users mentioned, author excluded.
    pub mentions_resolved: usize,
    /// Set when resolution aborted. No mention events were sent.
    pub mention_error: Option<String>,
}

impl FanoutOutcome {
    /// "success", "partial" or "failed".
    pub fn status(&self) -> &'static str {
        if self.events_failed == 0 && self.mention_error.is_none() {
            "success"
        } else if self.events_published > 0 {
            "partial"
        } else {
            "failed"
        }
    }
}

/// Runs fan-out jobs.
#[derive(Clone)]
pub struct FanoutService {
    publisher: EventPublisher,
    resolver: MentionResolver,
    recorder: Option<Arc<dyn MentionRecorder>>,
    shutdown: CancellationToken,
    timeout: Duration,
}

impl FanoutService {
    pub fn new(
        publisher: EventPublisher,
        resolver: MentionResolver,
        recorder: Option<Arc<dyn MentionRecorder>>,
        shutdown: CancellationToken,
        timeout: Duration,
    ) -> Self {
        Self {
            publisher,
            resolver,
            recorder,
            shutdown,
            timeout,
        }
    }

    /// Run `job` on a new task and return immediately.
    pub fn dispatch(&self, job: FanoutJob) -> JoinHandle<FanoutOutcome> {
        let service = self.clone();
        let span = tracing::debug_span!("clubhouse.fanout.dispatch", kind = job.kind());
        tokio::spawn(async move { service.run(job).await }.instrument(span))
    }

    /// Run `job` to completion under a fresh scope.
    #[instrument(skip_all, name = "clubhouse.fanout.run", fields(kind = job.kind()))]
    pub async fn run(&self, job: FanoutJob) -> FanoutOutcome {
        let started = Instant::now();
        let scope = FanoutScope::with_timeout(&self.shutdown, self.timeout);
        let mut outcome = FanoutOutcome::default();

        self.publish_entity_events(&scope, &job, &mut outcome).await;

        if let Some(source) = job.mention_source() {
            self.fan_out_mentions(&scope, &source, &mut outcome).await;
        }

        let status = outcome.status();
        record_fanout(status, started.elapsed());

        if status == "success" {
            tracing::debug!(
                target: "clubhouse.services.fanout",
                events_published = outcome.events_published,
                mentions_resolved = outcome.mentions_resolved,
                "Fan-out complete"
            );
        } else {
            tracing::warn!(
                target: "clubhouse.services.fanout",
                status,
                events_published = outcome.events_published,
                events_failed = outcome.events_failed,
                mentions_resolved = outcome.mentions_resolved,
                mention_error = ?outcome.mention_error,
                "Fan-out incomplete"
            );
        }

        outcome
    }

    async fn publish_entity_events(
        &self,
        scope: &FanoutScope,
        job: &FanoutJob,
        outcome: &mut FanoutOutcome,
    ) {
        match job {
            FanoutJob::PostCreated(post) => {
                let channel = format_channel(ChannelPrefix::Section, post.section_id);
                self.publish_counted(scope, &channel, EventType::NewPost, post, outcome)
                    .await;
            }
            FanoutJob::PostUpdated { post, .. } => {
                let channel = format_channel(ChannelPrefix::Post, post.id);
                self.publish_counted(scope, &channel, EventType::PostUpdated, post, outcome)
                    .await;
            }
            FanoutJob::PostDeleted {
                post_id,
                section_id,
                ..
            } => {
                let data = DeletedEventData {
                    post_id: Some(*post_id),
                    comment_id: None,
                    section_id: Some(*section_id),
                };
                for channel in [
                    format_channel(ChannelPrefix::Post, post_id),
                    format_channel(ChannelPrefix::Section, section_id),
                ] {
                    self.publish_counted(scope, &channel, EventType::PostDeleted, &data, outcome)
                        .await;
                }
            }
            FanoutJob::CommentCreated(comment) => {
                let channel = format_channel(ChannelPrefix::Post, comment.post_id);
                self.publish_counted(scope, &channel, EventType::NewComment, comment, outcome)
                    .await;
            }
            FanoutJob::CommentUpdated { comment, .. } => {
                for channel in [
                    format_channel(ChannelPrefix::Post, comment.post_id),
                    format_channel(ChannelPrefix::Comment, comment.id),
                ] {
                    self.publish_counted(
                        scope,
                        &channel,
                        EventType::CommentUpdated,
                        comment,
                        outcome,
                    )
                    .await;
                }
            }
            FanoutJob::CommentDeleted {
                comment_id,
                post_id,
                ..
            } => {
                let data = DeletedEventData {
                    post_id: Some(*post_id),
                    comment_id: Some(*comment_id),
                    section_id: None,
                };
                let channel = format_channel(ChannelPrefix::Post, post_id);
                self.publish_counted(scope, &channel, EventType::CommentDeleted, &data, outcome)
                    .await;
            }
            FanoutJob::ReactionAdded(data) => {
                let channel = format_channel(ChannelPrefix::Post, data.post_id);
                self.publish_counted(scope, &channel, EventType::ReactionAdded, data, outcome)
                    .await;
            }
            FanoutJob::ReactionRemoved(data) => {
                let channel = format_channel(ChannelPrefix::Post, data.post_id);
                self.publish_counted(scope, &channel, EventType::ReactionRemoved, data, outcome)
                    .await;
            }
        }
    }

    async fn fan_out_mentions(
        &self,
        scope: &FanoutScope,
        source: &MentionSource<'_>,
        outcome: &mut FanoutOutcome,
    ) {
        let candidates = match source.previous_content {
            Some(previous) => added_mentions(source.content, previous),
            None => extract_mentions(source.content),
        };
        if candidates.is_empty() || !self.resolver.is_enabled() {
            return;
        }

        let mentioned = match scope
            .run(self.resolver.resolve(&candidates, source.author_id))
            .await
        {
            Ok(Ok(ids)) => ids,
            Ok(Err(e)) => {
                outcome.mention_error = Some(e.to_string());
                return;
            }
            Err(scope_err) => {
                tracing::warn!(
                    target: "clubhouse.services.fanout",
                    error = %scope_err,
                    "Mention resolution cut off"
                );
                outcome.mention_error = Some(scope_err.to_string());
                return;
            }
        };

        outcome.mentions_resolved = mentioned.len();
        record_mentions_resolved(mentioned.len());
        if mentioned.is_empty() {
            return;
        }

        let author: Option<UserSummary> = scope
            .run(self.resolver.author_summary(source.author_id))
            .await
            .unwrap_or(None);
        let excerpt = truncate_excerpt(source.content);

        for user_id in mentioned {
            let record = MentionRecord {
                mentioned_user_id: user_id,
                mentioning_user_id: source.author_id,
                post_id: Some(source.post_id),
                comment_id: source.comment_id,
                excerpt: excerpt.clone(),
            };
            self.record(scope, &record).await;

            let data = MentionEventData {
                mentioned_user_id: user_id,
                mentioning_user_id: source.author_id,
                mentioning_user: author.clone(),
                content_excerpt: excerpt.clone(),
                post_id: Some(source.post_id),
                comment_id: source.comment_id,
            };
            let channel = format_channel(ChannelPrefix::UserMentions, user_id);
            self.publish_counted(scope, &channel, EventType::Mention, &data, outcome)
                .await;
        }
    }

    async fn record(&self, scope: &FanoutScope, record: &MentionRecord) {
        let Some(recorder) = &self.recorder else {
            return;
        };
        match scope.run(recorder.record_mention(record)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(
                    target: "clubhouse.services.fanout",
                    error = %e,
                    mentioned_user_id = %record.mentioned_user_id,
                    "Failed to record mention notification"
                );
            }
            Err(scope_err) => {
                tracing::warn!(
                    target: "clubhouse.services.fanout",
                    error = %scope_err,
                    "Mention notification cut off"
                );
            }
        }
    }

    async fn publish_counted<T: Serialize + ?Sized>(
        &self,
        scope: &FanoutScope,
        channel: &str,
        event_type: EventType,
        data: &T,
        outcome: &mut FanoutOutcome,
    ) {
        match self.publisher.publish(scope, channel, event_type, data).await {
            Ok(()) => outcome.events_published += 1,
            Err(e) => {
                outcome.events_failed += 1;
                tracing::warn!(
                    target: "clubhouse.services.fanout",
                    error = %e,
                    channel = %channel,
                    event_type = %event_type,
                    "Event not delivered"
                );
            }
        }
    }
}

/// Mock mention recorder for testing.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MockMentionRecorder {
        fail: AtomicBool,
        records: Mutex<Vec<MentionRecord>>,
    }

    impl MockMentionRecorder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_failing(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }

        pub fn records(&self) -> Vec<MentionRecord> {
            self.records
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
        }
    }

    #[async_trait]
    impl MentionRecorder for MockMentionRecorder {
        async fn record_mention(&self, record: &MentionRecord) -> Result<(), ClubhouseError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ClubhouseError::Database("mock recorder failure".to_string()));
            }
            self.records
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(record.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::mock::MockMentionRecorder;
    use super::*;
    use crate::services::broker::mock::MockBroker;
    use crate::services::broker::Broker;
    use crate::services::mentions::mock::MockUserLookup;
    use crate::services::mentions::UserLookup;
    use chrono::Utc;

    struct Harness {
        broker: Arc<MockBroker>,
        lookup: Arc<MockUserLookup>,
        recorder: Arc<MockMentionRecorder>,
        shutdown: CancellationToken,
        service: FanoutService,
    }

    fn harness_with(broker: MockBroker, lookup: MockUserLookup) -> Harness {
        let broker = Arc::new(broker);
        let lookup = Arc::new(lookup);
        let recorder = Arc::new(MockMentionRecorder::new());
        let shutdown = CancellationToken::new();
        let service = FanoutService::new(
            EventPublisher::new(Some(broker.clone() as Arc<dyn Broker>)),
            MentionResolver::new(Some(lookup.clone() as Arc<dyn UserLookup>)),
            Some(recorder.clone() as Arc<dyn MentionRecorder>),
            shutdown.clone(),
            Duration::from_secs(2),
        );
        Harness {
            broker,
            lookup,
            recorder,
            shutdown,
            service,
        }
    }

    fn harness() -> Harness {
        harness_with(
            MockBroker::new(),
            MockUserLookup::new()
                .with_user("alice")
                .with_user("bob")
                .with_user("carol"),
        )
    }

    fn comment_by(author_id: UserId, content: &str) -> CommentResponse {
        CommentResponse {
            id: CommentId::new(),
            post_id: PostId::new(),
            author_id,
            parent_comment_id: None,
            content: content.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn post_by(author_id: UserId, content: &str) -> PostResponse {
        PostResponse {
            id: PostId::new(),
            section_id: SectionId::new(),
            author_id,
            title: "Weekly sync".to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_comment_publishes_entity_event_then_mentions() {
        let h = harness();
        let alice = h.lookup.id_of("alice").unwrap();
        let bob = h.lookup.id_of("bob").unwrap();
        let comment = comment_by(alice, "thanks @bob and @Carol");
        let post_channel = format_channel(ChannelPrefix::Post, comment.post_id);

        let outcome = h
            .service
            .run(FanoutJob::CommentCreated(comment.clone()))
            .await;

        assert_eq!(outcome.status(), "success");
        assert_eq!(outcome.events_published, 3);
        assert_eq!(outcome.mentions_resolved, 2);

        let published = h.broker.published();
        assert_eq!(published.len(), 3);
        let first = published.first().unwrap();
        assert_eq!(first.channel, post_channel);
        assert_eq!(first.json()["type"], "new_comment");
        assert_eq!(first.json()["data"]["content"], "thanks @bob and @Carol");

        let bob_events = h
            .broker
            .published_on(&format_channel(ChannelPrefix::UserMentions, bob));
        assert_eq!(bob_events.len(), 1);
        let mention = bob_events.first().unwrap().json();
        assert_eq!(mention["type"], "mention");
        assert_eq!(mention["data"]["mentioned_user_id"], bob.to_string());
        assert_eq!(mention["data"]["mentioning_user_id"], alice.to_string());
        assert_eq!(mention["data"]["mentioning_user"]["username"], "alice");
        assert_eq!(mention["data"]["comment_id"], comment.id.to_string());
        assert_eq!(mention["data"]["post_id"], comment.post_id.to_string());
        assert_eq!(mention["data"]["content_excerpt"], "thanks @bob and @Carol");
    }

    #[tokio::test(start_paused = true)]
    async fn test_self_and_unknown_mentions_are_skipped() {
        let h = harness();
        let alice = h.lookup.id_of("alice").unwrap();
        let comment = comment_by(alice, "@alice talking to @nobody_here");

        let outcome = h.service.run(FanoutJob::CommentCreated(comment)).await;

        assert_eq!(outcome.mentions_resolved, 0);
        assert_eq!(outcome.events_published, 1);
        assert!(h.recorder.records().is_empty());
        assert!(h
            .broker
            .published()
            .iter()
            .all(|m| !m.channel.starts_with("user_mentions:")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_failure_keeps_entity_event() {
        let h = harness();
        h.lookup.set_failing(true);
        let comment = comment_by(UserId::new(), "hey @bob");

        let outcome = h.service.run(FanoutJob::CommentCreated(comment)).await;

        assert_eq!(outcome.events_published, 1);
        assert_eq!(outcome.mentions_resolved, 0);
        assert!(outcome.mention_error.is_some());
        assert_eq!(outcome.status(), "partial");
        assert_eq!(h.broker.published().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mentions_are_recorded_before_publish() {
        let h = harness();
        let alice = h.lookup.id_of("alice").unwrap();
        let bob = h.lookup.id_of("bob").unwrap();
        let post = post_by(alice, "cc @bob");

        h.service.run(FanoutJob::PostCreated(post.clone())).await;

        let records = h.recorder.records();
        assert_eq!(
            records,
            vec![MentionRecord {
                mentioned_user_id: bob,
                mentioning_user_id: alice,
                post_id: Some(post.id),
                comment_id: None,
                excerpt: Some("cc @bob".to_string()),
            }]
        );

        let first = h.broker.published().first().unwrap().clone();
        assert_eq!(
            first.channel,
            format_channel(ChannelPrefix::Section, post.section_id)
        );
        assert_eq!(first.json()["type"], "new_post");
    }

    #[tokio::test(start_paused = true)]
    async fn test_recorder_failure_does_not_block_event() {
        let h = harness();
        h.recorder.set_failing(true);
        let bob = h.lookup.id_of("bob").unwrap();
        let comment = comment_by(UserId::new(), "@bob look");

        let outcome = h.service.run(FanoutJob::CommentCreated(comment)).await;

        assert_eq!(outcome.status(), "success");
        assert_eq!(
            h.broker
                .published_on(&format_channel(ChannelPrefix::UserMentions, bob))
                .len(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_broker_outage_is_absorbed() {
        let h = harness_with(
            MockBroker::always_failing(),
            MockUserLookup::new().with_user("bob"),
        );
        let comment = comment_by(UserId::new(), "@bob");

        let outcome = h.service.run(FanoutJob::CommentCreated(comment)).await;

        assert_eq!(outcome.events_published, 0);
        assert_eq!(outcome.events_failed, 2);
        assert_eq!(outcome.mentions_resolved, 1);
        assert_eq!(outcome.status(), "failed");
        assert_eq!(h.broker.call_count(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_fanout() {
        let h = harness();
        h.shutdown.cancel();
        let comment = comment_by(UserId::new(), "@bob");

        let outcome = h.service.run(FanoutJob::CommentCreated(comment)).await;

        assert_eq!(outcome.events_published, 0);
        assert_eq!(h.broker.call_count(), 0);
        assert_eq!(outcome.status(), "failed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bounds_slow_broker() {
        let h = harness_with(
            MockBroker::new().with_delay(Duration::from_secs(5)),
            MockUserLookup::new(),
        );
        let started = Instant::now();

        let outcome = h
            .service
            .run(FanoutJob::PostUpdated {
                post: post_by(UserId::new(), "no mentions"),
                previous_content: String::new(),
            })
            .await;

        assert_eq!(outcome.events_failed, 1);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_post_delete_targets_post_and_section() {
        let h = harness();
        let post_id = PostId::new();
        let section_id = SectionId::new();

        let outcome = h
            .service
            .run(FanoutJob::PostDeleted {
                post_id,
                section_id,
                author_id: UserId::new(),
            })
            .await;

        assert_eq!(outcome.events_published, 2);
        let channels: Vec<String> = h.broker.published().into_iter().map(|m| m.channel).collect();
        assert_eq!(
            channels,
            vec![
                format_channel(ChannelPrefix::Post, post_id),
                format_channel(ChannelPrefix::Section, section_id),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_comment_update_targets_post_and_comment() {
        let h = harness();
        let comment = comment_by(UserId::new(), "edited");

        h.service
            .run(FanoutJob::CommentUpdated {
                comment: comment.clone(),
                previous_content: "edtied".to_string(),
            })
            .await;

        let channels: Vec<String> = h.broker.published().into_iter().map(|m| m.channel).collect();
        assert_eq!(
            channels,
            vec![
                format_channel(ChannelPrefix::Post, comment.post_id),
                format_channel(ChannelPrefix::Comment, comment.id),
            ]
        );
    }

    #[test]
    fn test_added_mentions() {
        assert_eq!(added_mentions("@bob @carol", "@bob"), vec!["carol"]);
        assert_eq!(added_mentions("@Bob again", "hi @bob"), Vec::<String>::new());
        assert_eq!(added_mentions("@bob", ""), vec!["bob"]);
        assert!(added_mentions("", "@bob").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_notifies_only_added_mentions() {
        let h = harness();
        let alice = h.lookup.id_of("alice").unwrap();
        let bob = h.lookup.id_of("bob").unwrap();
        let carol = h.lookup.id_of("carol").unwrap();
        let comment = comment_by(alice, "cc @Bob and now @carol");

        let outcome = h
            .service
            .run(FanoutJob::CommentUpdated {
                comment: comment.clone(),
                previous_content: "cc @bob".to_string(),
            })
            .await;

        assert_eq!(outcome.status(), "success");
        assert_eq!(outcome.mentions_resolved, 1);
        let records = h.recorder.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].mentioned_user_id, carol);
        assert_eq!(records[0].comment_id, Some(comment.id));
        assert!(h
            .broker
            .published_on(&format_channel(ChannelPrefix::UserMentions, bob))
            .is_empty());
        assert_eq!(
            h.broker
                .published_on(&format_channel(ChannelPrefix::UserMentions, carol))
                .len(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_without_new_mentions_sends_only_update() {
        let h = harness();
        let alice = h.lookup.id_of("alice").unwrap();
        let post = post_by(alice, "@bob, fixed the agenda");

        let outcome = h
            .service
            .run(FanoutJob::PostUpdated {
                post: post.clone(),
                previous_content: "@bob, fixed the agneda".to_string(),
            })
            .await;

        assert_eq!(outcome.events_published, 1);
        assert_eq!(outcome.mentions_resolved, 0);
        assert!(h.recorder.records().is_empty());
        let published = h.broker.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].channel, format_channel(ChannelPrefix::Post, post.id));
        assert_eq!(published[0].json()["type"], "post_updated");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaction_event_carries_count() {
        let h = harness();
        let data = ReactionEventData {
            post_id: PostId::new(),
            user_id: UserId::new(),
            emoji: "tada".to_string(),
            count: 4,
        };

        h.service.run(FanoutJob::ReactionAdded(data.clone())).await;

        let msg = h.broker.published().first().unwrap().json();
        assert_eq!(msg["type"], "reaction_added");
        assert_eq!(msg["data"]["count"], 4);
        assert_eq!(msg["data"]["emoji"], "tada");
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_resolver_skips_mentions() {
        let broker = Arc::new(MockBroker::new());
        let service = FanoutService::new(
            EventPublisher::new(Some(broker.clone() as Arc<dyn Broker>)),
            MentionResolver::disabled(),
            None,
            CancellationToken::new(),
            Duration::from_secs(2),
        );

        let outcome = service
            .run(FanoutJob::CommentCreated(comment_by(UserId::new(), "@bob")))
            .await;

        assert_eq!(outcome.mentions_resolved, 0);
        assert_eq!(broker.published().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_runs_in_background() {
        let h = harness();
        let handle = h
            .service
            .dispatch(FanoutJob::CommentCreated(comment_by(UserId::new(), "hi")));

        let outcome = handle.await.unwrap();

        assert_eq!(outcome.events_published, 1);
    }
}
