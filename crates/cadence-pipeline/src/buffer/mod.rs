//! Publisher API client ("Buffer-style" post-drafting service).
//!
//! The API is consumed, never implemented: profile lookup, draft
//! creation, publish, delete, and per-post stats. The orchestrator and
//! webhook handlers depend on the [`PublisherApi`] trait so they can be
//! tested against an in-process fake; [`BufferClient`] is the real
//! reqwest-backed implementation.

mod client;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use cadence_core::{Error, Platform, Result, MAX_CAROUSEL_ITEMS};

pub use client::{BufferClient, BufferConfig};

/// A remote posting profile (one per connected social account).
#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    /// Opaque remote profile id.
    pub id: String,
    /// Service name reported by the API (e.g. "instagram").
    pub service: String,
    /// Human-readable account name, when the API provides one.
    #[serde(default)]
    pub formatted_username: Option<String>,
}

/// External publisher API surface.
#[async_trait]
pub trait PublisherApi: Send + Sync {
    /// List the connected posting profiles.
    async fn list_profiles(&self) -> Result<Vec<Profile>>;

    /// Create a draft on each profile; returns profile id → draft id.
    async fn create_draft(
        &self,
        platform: Platform,
        profile_ids: &[String],
        text: &str,
        media: &[String],
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<BTreeMap<String, String>>;

    /// Publish a previously created draft.
    async fn publish(&self, draft_id: &str) -> Result<()>;

    /// Delete a draft that will not be published.
    async fn delete(&self, draft_id: &str) -> Result<()>;

    /// Fetch post-level stats for a published draft.
    async fn get_post(&self, draft_id: &str) -> Result<serde_json::Value>;
}

/// Pre-flight validation for draft creation.
///
/// Runs before any network call so bad input never enters the retry loop.
pub fn validate_draft(
    platform: Platform,
    profile_ids: &[String],
    text: &str,
    media: &[String],
) -> Result<()> {
    if profile_ids.is_empty() {
        return Err(Error::Validation("no target profiles".to_string()));
    }
    if media.is_empty() {
        return Err(Error::Validation("post has no media".to_string()));
    }
    if media.len() > MAX_CAROUSEL_ITEMS {
        return Err(Error::Validation(format!(
            "{} media items exceeds the API ceiling of {}",
            media.len(),
            MAX_CAROUSEL_ITEMS
        )));
    }
    let limit = platform.caption_limit();
    let chars = text.chars().count();
    if chars > limit {
        return Err(Error::Validation(format!(
            "caption is {chars} characters; {platform} allows {limit}"
        )));
    }
    Ok(())
}
