//! Approval webhook handlers.
//!
//! Each pending-approval digest entry carries two signed links, one per
//! action. A click lands here as `POST /webhooks/{action}?postId&ts&sig`.
//!
//! Checks run in a fixed order so the cheapest rejection wins and the
//! response tells the approver exactly why a click did nothing:
//! parameter shape, timestamp window, signature, per-post cooldown,
//! post existence, then the conditional state transition. Only one of
//! two racing requests for the same post can pass the final step.

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cadence_core::{signing, ApprovalAction, Post, PostStatus};

use crate::error::ApiError;
use crate::state::AppState;

/// Actor recorded in the audit trail for webhook-driven actions.
const WEBHOOK_ACTOR: &str = "webhook";

/// Query parameters of a signed approval link.
#[derive(Debug, Clone, Deserialize)]
pub struct ApprovalParams {
    #[serde(rename = "postId")]
    pub post_id: Option<String>,
    pub ts: Option<String>,
    pub sig: Option<String>,
}

/// Webhook action response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    pub success: bool,
    pub post_id: String,
    pub status: PostStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<DateTime<Utc>>,
}

/// `POST /webhooks/approve` - approve a draft and publish it.
pub async fn approve(
    State(state): State<AppState>,
    Query(params): Query<ApprovalParams>,
) -> Result<Json<ActionResponse>, ApiError> {
    let post = authorize(&state, params, ApprovalAction::Approve)?;

    state
        .store
        .transition_status(&post.id, PostStatus::Draft, PostStatus::Approved, Some(WEBHOOK_ACTOR))
        .map_err(reject("conflict"))?;
    state
        .store
        .record_approval(&post.id, ApprovalAction::Approve, WEBHOOK_ACTOR, None)
        .map_err(ApiError::from)?;

    // Publish failure reverts the post to draft inside the publisher, so
    // the next digest surfaces it again
    let published = state
        .publisher
        .publish_post(&post.id, WEBHOOK_ACTOR)
        .await
        .map_err(reject("publish_failed"))?;

    Ok(Json(ActionResponse {
        success: true,
        post_id: published.id.clone(),
        status: published.status,
        buffer_id: published.draft_ids.values().next().cloned(),
        approved_at: published.approved_at,
        rejected_at: None,
    }))
}

/// `POST /webhooks/reject` - reject a draft and delete its remote drafts.
pub async fn reject_post(
    State(state): State<AppState>,
    Query(params): Query<ApprovalParams>,
) -> Result<Json<ActionResponse>, ApiError> {
    let post = authorize(&state, params, ApprovalAction::Reject)?;

    let rejected = state
        .publisher
        .reject_post(&post.id, WEBHOOK_ACTOR, None)
        .await
        .map_err(reject("conflict"))?;

    Ok(Json(ActionResponse {
        success: true,
        post_id: rejected.id.clone(),
        status: rejected.status,
        buffer_id: None,
        approved_at: None,
        rejected_at: Some(rejected.updated_at),
    }))
}

/// Run the shared check sequence and load the post.
fn authorize(
    state: &AppState,
    params: ApprovalParams,
    action: ApprovalAction,
) -> Result<Post, ApiError> {
    metrics::counter!("webhook_requests_total", "action" => action.as_str()).increment(1);

    let post_id = require(params.post_id, "postId")?;
    let ts: i64 = require(params.ts, "ts")?
        .parse()
        .map_err(|_| refused("bad_params", ApiError::BadRequest("ts must be a unix timestamp".to_string())))?;
    let sig = require(params.sig, "sig")?;

    signing::verify(
        state.config.webhook_secret.as_bytes(),
        ts,
        &post_id,
        action,
        &sig,
        Utc::now().timestamp(),
        state.config.timestamp_window,
    )
    .map_err(|r| refused(rejection_reason(&r), r.into()))?;

    if !state.cooldown.try_acquire(&post_id) {
        return Err(refused("cooldown", ApiError::CoolingDown));
    }

    state
        .store
        .get_post(&post_id)
        .map_err(ApiError::from)?
        .ok_or_else(|| refused("not_found", ApiError::NotFound(format!("post {post_id}"))))
}

fn require(value: Option<String>, name: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| refused("bad_params", ApiError::BadRequest(format!("{name} is required"))))
}

fn rejection_reason(rejection: &signing::SignatureRejection) -> &'static str {
    match rejection {
        signing::SignatureRejection::Expired => "expired",
        signing::SignatureRejection::InvalidSignature => "bad_signature",
    }
}

fn refused(reason: &'static str, err: ApiError) -> ApiError {
    metrics::counter!("webhook_rejected_total", "reason" => reason).increment(1);
    err
}

/// Map a domain error into a counted webhook rejection.
fn reject(reason: &'static str) -> impl FnOnce(cadence_core::Error) -> ApiError {
    move |e| refused(reason, e.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use cadence_core::{ContentType, Error, NewPost, Platform, Result};
    use cadence_pipeline::{Profile, PublisherApi, Store};

    use crate::state::Config;

    #[derive(Default)]
    struct StubApi {
        fail_publish: bool,
        deleted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PublisherApi for StubApi {
        async fn list_profiles(&self) -> Result<Vec<Profile>> {
            Ok(vec![])
        }

        async fn create_draft(
            &self,
            _platform: Platform,
            _profile_ids: &[String],
            _text: &str,
            _media: &[String],
            _scheduled_at: Option<DateTime<Utc>>,
        ) -> Result<BTreeMap<String, String>> {
            Ok(BTreeMap::new())
        }

        async fn publish(&self, _draft_id: &str) -> Result<()> {
            if self.fail_publish {
                return Err(Error::Api {
                    status: 500,
                    message: "upstream down".to_string(),
                });
            }
            Ok(())
        }

        async fn delete(&self, draft_id: &str) -> Result<()> {
            self.deleted.lock().push(draft_id.to_string());
            Ok(())
        }

        async fn get_post(&self, _draft_id: &str) -> Result<serde_json::Value> {
            Ok(serde_json::json!({}))
        }
    }

    const SECRET: &str = "webhook-test-secret";

    fn test_state(api: StubApi) -> AppState {
        let config = Config {
            bind_addr: "127.0.0.1:0".to_string(),
            db_path: PathBuf::from(":memory:"),
            webhook_secret: SECRET.to_string(),
            timestamp_window: Duration::from_secs(900),
            cooldown_window: Duration::from_secs(60),
            buffer_url: "http://localhost".to_string(),
            buffer_token: "unused".to_string(),
        };
        let store = Arc::new(Store::open_in_memory().unwrap());
        AppState::with_parts(config, store, Arc::new(api))
    }

    fn insert_draft(state: &AppState) -> String {
        let post = state
            .store
            .insert_post(NewPost {
                content_type: ContentType::Single,
                platform: Platform::Instagram,
                caption: format!("caption {}", uuid::Uuid::new_v4()),
                hashtags: vec![],
                media_urls: vec!["a.jpg".to_string()],
                thumbnail_url: None,
                scheduled_at: None,
            })
            .unwrap();
        let drafts: BTreeMap<String, String> =
            [("ig-1".to_string(), format!("buffer-{}", post.id))].into();
        state.store.set_draft_ids(&post.id, &drafts).unwrap();
        post.id
    }

    fn signed_params(post_id: &str, action: ApprovalAction, ts: i64) -> ApprovalParams {
        ApprovalParams {
            post_id: Some(post_id.to_string()),
            ts: Some(ts.to_string()),
            sig: Some(signing::sign(SECRET.as_bytes(), ts, post_id, action)),
        }
    }

    #[tokio::test]
    async fn test_approve_publishes_and_audits() {
        let state = test_state(StubApi::default());
        let id = insert_draft(&state);
        let params = signed_params(&id, ApprovalAction::Approve, Utc::now().timestamp());

        let response = approve(State(state.clone()), Query(params)).await.unwrap();
        assert!(response.0.success);
        assert_eq!(response.0.status, PostStatus::Published);
        assert_eq!(response.0.buffer_id.as_deref(), Some(&*format!("buffer-{id}")));
        assert!(response.0.approved_at.is_some());

        let trail = state.store.approvals_for_post(&id).unwrap();
        assert!(trail.iter().any(|a| a.action == ApprovalAction::Approve));
    }

    #[tokio::test]
    async fn test_reject_tears_down_remote_drafts() {
        let state = test_state(StubApi::default());
        let id = insert_draft(&state);
        let params = signed_params(&id, ApprovalAction::Reject, Utc::now().timestamp());

        let response = reject_post(State(state.clone()), Query(params)).await.unwrap();
        assert!(response.0.success);
        assert_eq!(response.0.status, PostStatus::Rejected);
        assert!(response.0.rejected_at.is_some());
        assert_eq!(
            state.store.get_post(&id).unwrap().unwrap().status,
            PostStatus::Rejected
        );
    }

    #[tokio::test]
    async fn test_missing_param_is_bad_request() {
        let state = test_state(StubApi::default());
        let params = ApprovalParams {
            post_id: None,
            ts: Some(Utc::now().timestamp().to_string()),
            sig: Some("deadbeef".to_string()),
        };
        let err = approve(State(state), Query(params)).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_stale_link_is_expired_not_invalid() {
        let state = test_state(StubApi::default());
        let id = insert_draft(&state);
        // Correctly signed two hours ago
        let ts = Utc::now().timestamp() - 7_200;
        let params = signed_params(&id, ApprovalAction::Approve, ts);

        let err = approve(State(state), Query(params)).await.unwrap_err();
        assert!(matches!(err, ApiError::Expired));
    }

    #[tokio::test]
    async fn test_tampered_post_id_fails_signature() {
        let state = test_state(StubApi::default());
        let id = insert_draft(&state);
        let other = insert_draft(&state);
        let ts = Utc::now().timestamp();
        // Signature for one post, replayed against another
        let mut params = signed_params(&id, ApprovalAction::Approve, ts);
        params.post_id = Some(other);

        let err = approve(State(state), Query(params)).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidSignature));
    }

    #[tokio::test]
    async fn test_approve_signature_does_not_authorize_reject() {
        let state = test_state(StubApi::default());
        let id = insert_draft(&state);
        let ts = Utc::now().timestamp();
        let mut params = signed_params(&id, ApprovalAction::Approve, ts);
        params.sig = Some(signing::sign(SECRET.as_bytes(), ts, &id, ApprovalAction::Approve));

        let err = reject_post(State(state), Query(params)).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidSignature));
    }

    #[tokio::test]
    async fn test_second_click_hits_cooldown() {
        let state = test_state(StubApi::default());
        let id = insert_draft(&state);
        let ts = Utc::now().timestamp();

        approve(State(state.clone()), Query(signed_params(&id, ApprovalAction::Approve, ts)))
            .await
            .unwrap();
        let err = approve(State(state), Query(signed_params(&id, ApprovalAction::Approve, ts)))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::CoolingDown));
    }

    #[tokio::test]
    async fn test_unknown_post_is_not_found() {
        let state = test_state(StubApi::default());
        let params = signed_params("no-such-post", ApprovalAction::Approve, Utc::now().timestamp());
        let err = approve(State(state), Query(params)).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_approve_of_approved_post_is_conflict() {
        let state = test_state(StubApi::default());
        let id = insert_draft(&state);
        state
            .store
            .transition_status(&id, PostStatus::Draft, PostStatus::Approved, Some("alice"))
            .unwrap();

        let params = signed_params(&id, ApprovalAction::Approve, Utc::now().timestamp());
        let err = approve(State(state), Query(params)).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_publish_failure_reverts_and_reports() {
        let state = test_state(StubApi {
            fail_publish: true,
            ..StubApi::default()
        });
        let id = insert_draft(&state);
        let params = signed_params(&id, ApprovalAction::Approve, Utc::now().timestamp());

        let err = approve(State(state.clone()), Query(params)).await.unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));
        // Back in draft so the next digest surfaces it again
        assert_eq!(
            state.store.get_post(&id).unwrap().unwrap().status,
            PostStatus::Draft
        );
    }
}
