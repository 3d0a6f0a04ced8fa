//! Publisher orchestrator.
//!
//! Bridges the local store and the remote publisher API: pushes drafts
//! out, publishes approved posts, tears down rejected ones, and pulls
//! engagement stats back in. All remote calls go through the
//! [`PublisherApi`] trait so the orchestrator can be exercised against
//! an in-process fake.

use std::collections::BTreeMap;
use std::sync::Arc;

use cadence_core::{ApprovalAction, Error, Platform, Post, PostStatus, Result};

use crate::buffer::{validate_draft, Profile, PublisherApi};
use crate::store::Store;

/// How many published posts one harvest pass will look at.
const HARVEST_BATCH: u32 = 200;

/// Per-post result of a [`Publisher::create_drafts`] run.
#[derive(Debug)]
pub struct DraftOutcome {
    pub post_id: String,
    /// Profile id → remote draft id on success.
    pub outcome: Result<BTreeMap<String, String>>,
}

/// Orchestrates the store and the remote publisher API.
pub struct Publisher {
    store: Arc<Store>,
    api: Arc<dyn PublisherApi>,
}

impl Publisher {
    pub fn new(store: Arc<Store>, api: Arc<dyn PublisherApi>) -> Self {
        Self { store, api }
    }

    /// Remote profile ids serving a platform, deduplicated.
    ///
    /// Platform aliases collapse onto one profile set, so a reel and a
    /// regular Instagram post both resolve the "instagram" profiles.
    async fn resolve_profiles(&self, platform: Platform) -> Result<Vec<String>> {
        let service = platform.canonical().as_str();
        let profiles = self.api.list_profiles().await?;
        let mut seen = std::collections::BTreeSet::new();
        let ids: Vec<String> = profiles
            .iter()
            .filter(|p: &&Profile| p.service.eq_ignore_ascii_case(service))
            .filter(|p| seen.insert(p.id.clone()))
            .map(|p| p.id.clone())
            .collect();
        if ids.is_empty() {
            return Err(Error::Validation(format!(
                "no connected profile for {service}"
            )));
        }
        Ok(ids)
    }

    /// Create remote drafts for a batch of posts.
    ///
    /// Each post is handled independently; one bad post never blocks the
    /// rest of the batch. Returned draft ids are persisted on the post
    /// before the next item is attempted.
    pub async fn create_drafts(&self, posts: &[Post]) -> Result<Vec<DraftOutcome>> {
        let mut profile_cache: BTreeMap<Platform, Vec<String>> = BTreeMap::new();
        let mut outcomes = Vec::with_capacity(posts.len());

        for post in posts {
            let outcome = self.create_one_draft(post, &mut profile_cache).await;
            match &outcome {
                Ok(ids) => {
                    metrics::counter!("drafts_created_total").increment(1);
                    tracing::info!(post_id = %post.id, drafts = ids.len(), "created remote drafts");
                }
                Err(e) => {
                    metrics::counter!("drafts_failed_total").increment(1);
                    tracing::warn!(post_id = %post.id, error = %e, "draft creation failed");
                }
            }
            outcomes.push(DraftOutcome {
                post_id: post.id.clone(),
                outcome,
            });
        }
        Ok(outcomes)
    }

    async fn create_one_draft(
        &self,
        post: &Post,
        profile_cache: &mut BTreeMap<Platform, Vec<String>>,
    ) -> Result<BTreeMap<String, String>> {
        let canonical = post.platform.canonical();
        if !profile_cache.contains_key(&canonical) {
            let ids = self.resolve_profiles(post.platform).await?;
            profile_cache.insert(canonical, ids);
        }
        let profile_ids = profile_cache
            .get(&canonical)
            .cloned()
            .unwrap_or_default();

        let text = compose_text(post);
        validate_draft(post.platform, &profile_ids, &text, &post.media_urls)?;

        let draft_ids = self
            .api
            .create_draft(
                post.platform,
                &profile_ids,
                &text,
                &post.media_urls,
                post.scheduled_at,
            )
            .await?;
        self.store.set_draft_ids(&post.id, &draft_ids)?;
        Ok(draft_ids)
    }

    /// Publish an approved post's remote drafts.
    ///
    /// One successful remote publish is enough to mark the post
    /// `Published`. Zero successes revert the post to `Draft` so the
    /// approval digest surfaces it again, and the last remote error is
    /// returned.
    pub async fn publish_post(&self, id: &str, actor: &str) -> Result<Post> {
        let post = self
            .store
            .get_post(id)?
            .ok_or_else(|| Error::NotFound(format!("post {id}")))?;
        if post.status != PostStatus::Approved {
            return Err(Error::InvalidTransition {
                from: post.status,
                to: PostStatus::Published,
            });
        }
        if post.draft_ids.is_empty() {
            self.revert_to_draft(id, actor)?;
            return Err(Error::Validation(format!("post {id} has no remote drafts")));
        }

        let mut successes = 0usize;
        let mut last_err: Option<Error> = None;
        for draft_id in post.draft_ids.values() {
            match self.api.publish(draft_id).await {
                Ok(()) => successes += 1,
                Err(e) => {
                    tracing::warn!(post_id = %id, draft_id = %draft_id, error = %e, "remote publish failed");
                    last_err = Some(e);
                }
            }
        }

        if successes == 0 {
            self.revert_to_draft(id, actor)?;
            return Err(last_err
                .unwrap_or_else(|| Error::Network("all remote publishes failed".to_string())));
        }

        self.store
            .transition_status(id, PostStatus::Approved, PostStatus::Published, Some(actor))?;
        self.store
            .record_approval(id, ApprovalAction::Approve, actor, Some("published"))?;
        metrics::counter!("posts_published_total").increment(1);
        tracing::info!(post_id = %id, successes, total = post.draft_ids.len(), "post published");

        self.store
            .get_post(id)?
            .ok_or_else(|| Error::NotFound(format!("post {id}")))
    }

    fn revert_to_draft(&self, id: &str, actor: &str) -> Result<()> {
        metrics::counter!("publish_reverts_total").increment(1);
        tracing::warn!(post_id = %id, "publish failed, reverting to draft");
        self.store
            .transition_status(id, PostStatus::Approved, PostStatus::Draft, Some(actor))
    }

    /// Reject a draft and tear down its remote drafts.
    ///
    /// The `Draft -> Rejected` transition is the gate: a post in any
    /// other status refuses before a single remote delete runs. Remote
    /// deletions after the transition are best-effort; a failed delete
    /// is logged and the rejection stands.
    pub async fn reject_post(&self, id: &str, actor: &str, note: Option<&str>) -> Result<Post> {
        let post = self
            .store
            .get_post(id)?
            .ok_or_else(|| Error::NotFound(format!("post {id}")))?;

        self.store
            .transition_status(id, PostStatus::Draft, PostStatus::Rejected, Some(actor))?;

        for draft_id in post.draft_ids.values() {
            if let Err(e) = self.api.delete(draft_id).await {
                tracing::warn!(post_id = %id, draft_id = %draft_id, error = %e, "remote draft delete failed");
            }
        }

        self.store
            .record_approval(id, ApprovalAction::Reject, actor, note)?;
        metrics::counter!("posts_rejected_total").increment(1);
        tracing::info!(post_id = %id, actor = %actor, "post rejected");

        self.store
            .get_post(id)?
            .ok_or_else(|| Error::NotFound(format!("post {id}")))
    }

    /// Pull engagement stats for published posts into `post_metrics`.
    ///
    /// Returns the number of stat snapshots stored. Per-draft fetch
    /// failures are logged and skipped.
    pub async fn harvest_metrics(&self) -> Result<usize> {
        let published = self.store.list_by_status(PostStatus::Published, HARVEST_BATCH)?;
        let mut harvested = 0usize;
        for post in &published {
            for draft_id in post.draft_ids.values() {
                match self.api.get_post(draft_id).await {
                    Ok(stats) => {
                        self.store.insert_metrics(&post.id, post.platform, &stats)?;
                        metrics::counter!("metrics_snapshots_total").increment(1);
                        harvested += 1;
                    }
                    Err(e) => {
                        tracing::warn!(post_id = %post.id, draft_id = %draft_id, error = %e, "stats fetch failed");
                    }
                }
            }
        }
        if harvested > 0 {
            tracing::info!(harvested, posts = published.len(), "harvested post metrics");
        }
        Ok(harvested)
    }
}

/// Caption plus hashtags as the remote post body.
fn compose_text(post: &Post) -> String {
    if post.hashtags.is_empty() {
        post.caption.clone()
    } else {
        format!("{}\n\n{}", post.caption, post.hashtags.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use parking_lot::Mutex;

    use cadence_core::{ContentType, NewPost};

    #[derive(Default)]
    struct FakeApi {
        profiles: Vec<Profile>,
        fail_publish: bool,
        fail_delete: bool,
        published: Mutex<Vec<String>>,
        deleted: Mutex<Vec<String>>,
        stats_fetched: Mutex<Vec<String>>,
    }

    impl FakeApi {
        fn with_instagram_profile() -> Self {
            Self {
                profiles: vec![
                    Profile {
                        id: "ig-1".to_string(),
                        service: "instagram".to_string(),
                        formatted_username: Some("@studio".to_string()),
                    },
                    // Duplicate id from a reconnected account
                    Profile {
                        id: "ig-1".to_string(),
                        service: "instagram".to_string(),
                        formatted_username: None,
                    },
                ],
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl PublisherApi for FakeApi {
        async fn list_profiles(&self) -> Result<Vec<Profile>> {
            Ok(self.profiles.clone())
        }

        async fn create_draft(
            &self,
            _platform: Platform,
            profile_ids: &[String],
            _text: &str,
            _media: &[String],
            _scheduled_at: Option<DateTime<Utc>>,
        ) -> Result<BTreeMap<String, String>> {
            Ok(profile_ids
                .iter()
                .map(|p| (p.clone(), format!("draft-for-{p}")))
                .collect())
        }

        async fn publish(&self, draft_id: &str) -> Result<()> {
            if self.fail_publish {
                return Err(Error::Api {
                    status: 500,
                    message: "upstream down".to_string(),
                });
            }
            self.published.lock().push(draft_id.to_string());
            Ok(())
        }

        async fn delete(&self, draft_id: &str) -> Result<()> {
            if self.fail_delete {
                return Err(Error::Network("connection reset".to_string()));
            }
            self.deleted.lock().push(draft_id.to_string());
            Ok(())
        }

        async fn get_post(&self, draft_id: &str) -> Result<serde_json::Value> {
            self.stats_fetched.lock().push(draft_id.to_string());
            Ok(serde_json::json!({ "likes": 42, "comments": 3 }))
        }
    }

    fn new_post(store: &Store, platform: Platform) -> Post {
        store
            .insert_post(NewPost {
                content_type: ContentType::Single,
                platform,
                caption: format!("caption {}", uuid::Uuid::new_v4()),
                hashtags: vec!["#studio".to_string()],
                media_urls: vec!["a.jpg".to_string()],
                thumbnail_url: None,
                scheduled_at: None,
            })
            .unwrap()
    }

    fn publisher(api: FakeApi) -> (Arc<Store>, Publisher) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let p = Publisher::new(Arc::clone(&store), Arc::new(api));
        (store, p)
    }

    // Keeps a handle on the fake so tests can inspect its call log.
    fn tracked_publisher(api: FakeApi) -> (Arc<Store>, Arc<FakeApi>, Publisher) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let api = Arc::new(api);
        let p = Publisher::new(Arc::clone(&store), Arc::clone(&api) as Arc<dyn PublisherApi>);
        (store, api, p)
    }

    #[tokio::test]
    async fn test_create_drafts_stores_draft_ids() {
        let (store, publisher) = publisher(FakeApi::with_instagram_profile());
        let post = new_post(&store, Platform::Instagram);

        let outcomes = publisher.create_drafts(&[post.clone()]).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].outcome.is_ok());

        let stored = store.get_post(&post.id).unwrap().unwrap();
        assert_eq!(stored.draft_ids.get("ig-1").map(String::as_str), Some("draft-for-ig-1"));
    }

    #[tokio::test]
    async fn test_reel_resolves_instagram_profiles() {
        let (store, publisher) = publisher(FakeApi::with_instagram_profile());
        let post = new_post(&store, Platform::InstagramReel);

        let outcomes = publisher.create_drafts(&[post]).await.unwrap();
        let ids = outcomes[0].outcome.as_ref().unwrap();
        // Duplicate profile entries collapse to one draft
        assert_eq!(ids.len(), 1);
        assert!(ids.contains_key("ig-1"));
    }

    #[tokio::test]
    async fn test_create_drafts_reports_partial_failure() {
        let (store, publisher) = publisher(FakeApi::with_instagram_profile());
        let good = new_post(&store, Platform::Instagram);
        // No tiktok profile connected, so this one fails
        let bad = new_post(&store, Platform::Tiktok);

        let outcomes = publisher.create_drafts(&[bad, good.clone()]).await.unwrap();
        assert!(outcomes[0].outcome.is_err());
        assert!(outcomes[1].outcome.is_ok());
        assert!(!store.get_post(&good.id).unwrap().unwrap().draft_ids.is_empty());
    }

    #[tokio::test]
    async fn test_publish_post_marks_published_and_audits() {
        let (store, publisher) = publisher(FakeApi::with_instagram_profile());
        let post = new_post(&store, Platform::Instagram);
        publisher.create_drafts(&[post.clone()]).await.unwrap();
        store
            .transition_status(&post.id, PostStatus::Draft, PostStatus::Approved, Some("alice"))
            .unwrap();

        let published = publisher.publish_post(&post.id, "alice").await.unwrap();
        assert_eq!(published.status, PostStatus::Published);

        let trail = store.approvals_for_post(&post.id).unwrap();
        assert!(trail.iter().any(|a| a.comment.as_deref() == Some("published")));
    }

    #[tokio::test]
    async fn test_publish_failure_reverts_to_draft() {
        let api = FakeApi {
            fail_publish: true,
            ..FakeApi::with_instagram_profile()
        };
        let (store, publisher) = publisher(api);
        let post = new_post(&store, Platform::Instagram);
        publisher.create_drafts(&[post.clone()]).await.unwrap();
        store
            .transition_status(&post.id, PostStatus::Draft, PostStatus::Approved, Some("alice"))
            .unwrap();

        let err = publisher.publish_post(&post.id, "alice").await.unwrap_err();
        assert!(matches!(err, Error::Api { status: 500, .. }));

        let reverted = store.get_post(&post.id).unwrap().unwrap();
        assert_eq!(reverted.status, PostStatus::Draft);
    }

    #[tokio::test]
    async fn test_publish_requires_approved_status() {
        let (store, publisher) = publisher(FakeApi::with_instagram_profile());
        let post = new_post(&store, Platform::Instagram);

        let err = publisher.publish_post(&post.id, "alice").await.unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition { from: PostStatus::Draft, to: PostStatus::Published }
        ));
    }

    #[tokio::test]
    async fn test_publish_unknown_post_is_not_found() {
        let (_store, publisher) = publisher(FakeApi::with_instagram_profile());
        let err = publisher.publish_post("nope", "alice").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_reject_deletes_remote_drafts() {
        let (store, api, publisher) = tracked_publisher(FakeApi::with_instagram_profile());
        let post = new_post(&store, Platform::Instagram);
        publisher.create_drafts(&[post.clone()]).await.unwrap();

        let rejected = publisher
            .reject_post(&post.id, "bob", Some("off brand"))
            .await
            .unwrap();
        assert_eq!(rejected.status, PostStatus::Rejected);
        assert_eq!(api.deleted.lock().len(), 1);

        let trail = store.approvals_for_post(&post.id).unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, ApprovalAction::Reject);
        assert_eq!(trail[0].comment.as_deref(), Some("off brand"));
    }

    #[tokio::test]
    async fn test_reject_survives_failed_remote_delete() {
        let api = FakeApi {
            fail_delete: true,
            ..FakeApi::with_instagram_profile()
        };
        let (store, publisher) = publisher(api);
        let post = new_post(&store, Platform::Instagram);
        publisher.create_drafts(&[post.clone()]).await.unwrap();

        let rejected = publisher.reject_post(&post.id, "bob", None).await.unwrap();
        assert_eq!(rejected.status, PostStatus::Rejected);
        assert_eq!(store.get_post(&post.id).unwrap().unwrap().status, PostStatus::Rejected);
    }

    #[tokio::test]
    async fn test_reject_published_post_errors_and_leaves_status() {
        let (store, api, publisher) = tracked_publisher(FakeApi::with_instagram_profile());
        let post = new_post(&store, Platform::Instagram);
        publisher.create_drafts(&[post.clone()]).await.unwrap();
        store
            .transition_status(&post.id, PostStatus::Draft, PostStatus::Approved, Some("alice"))
            .unwrap();
        publisher.publish_post(&post.id, "alice").await.unwrap();

        let err = publisher.reject_post(&post.id, "bob", None).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(
            store.get_post(&post.id).unwrap().unwrap().status,
            PostStatus::Published
        );
        // The refused reject must not have touched the live updates.
        assert!(api.deleted.lock().is_empty());
    }

    #[tokio::test]
    async fn test_harvest_metrics_stores_snapshots() {
        let (store, publisher) = publisher(FakeApi::with_instagram_profile());
        let post = new_post(&store, Platform::Instagram);
        publisher.create_drafts(&[post.clone()]).await.unwrap();
        store
            .transition_status(&post.id, PostStatus::Draft, PostStatus::Approved, Some("alice"))
            .unwrap();
        publisher.publish_post(&post.id, "alice").await.unwrap();

        let harvested = publisher.harvest_metrics().await.unwrap();
        assert_eq!(harvested, 1);

        let snapshots = store.metrics_for_post(&post.id).unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].metrics["likes"], 42);
    }
}
