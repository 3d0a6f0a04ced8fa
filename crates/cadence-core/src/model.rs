//! Domain value types for posts, carousels, and approvals.
//!
//! Persisted JSON columns (hashtags, media URLs, draft ids) are modeled as
//! native ordered collections here; serialization to the storage format
//! happens only at the persistence boundary in the store.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Error, MAX_CAROUSEL_ITEMS};

// ═══════════════════════════════════════════════════════════════════════════
// Platform
// ═══════════════════════════════════════════════════════════════════════════

/// Target social platform for a post.
///
/// `InstagramReel` is an alias platform: it publishes through the same
/// remote profile as `Instagram` but carries different content semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Instagram,
    InstagramReel,
    Facebook,
    Tiktok,
}

/// Carousel size bounds for a platform (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CarouselBounds {
    /// Minimum items for a valid carousel.
    pub min: usize,
    /// Maximum items per carousel.
    pub max: usize,
}

impl Platform {
    /// Stable string form used in the database and API payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Instagram => "instagram",
            Self::InstagramReel => "instagram_reel",
            Self::Facebook => "facebook",
            Self::Tiktok => "tiktok",
        }
    }

    /// The platform whose remote profile this one publishes through.
    ///
    /// Alias platforms (reels) collapse onto their parent so profile
    /// resolution never creates duplicate drafts for one remote profile.
    pub fn canonical(&self) -> Platform {
        match self {
            Self::InstagramReel => Self::Instagram,
            other => *other,
        }
    }

    /// Maximum caption length accepted by the platform.
    pub fn caption_limit(&self) -> usize {
        match self {
            Self::Instagram | Self::InstagramReel | Self::Tiktok => 2_200,
            Self::Facebook => 63_206,
        }
    }

    /// Carousel size bounds for this platform.
    ///
    /// The defaults are conservative; [`MAX_CAROUSEL_ITEMS`] is the hard
    /// ceiling imposed by the publisher API regardless of platform.
    pub fn carousel_bounds(&self) -> CarouselBounds {
        let bounds = match self {
            Self::Instagram => CarouselBounds { min: 2, max: 5 },
            Self::Facebook => CarouselBounds { min: 2, max: 5 },
            Self::InstagramReel | Self::Tiktok => CarouselBounds { min: 2, max: 5 },
        };
        debug_assert!(bounds.max <= MAX_CAROUSEL_ITEMS);
        bounds
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "instagram" => Ok(Self::Instagram),
            "instagram_reel" | "reel" => Ok(Self::InstagramReel),
            "facebook" => Ok(Self::Facebook),
            "tiktok" => Ok(Self::Tiktok),
            other => Err(Error::Validation(format!("unknown platform: {other}"))),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Post status state machine
// ═══════════════════════════════════════════════════════════════════════════

/// Lifecycle status of a post.
///
/// Legal transitions: `Draft → Approved → Published`, `Draft → Rejected`,
/// plus the publish-failure revert `Approved → Draft` so a post whose
/// remote publish failed reappears for manual retry instead of being
/// stuck approved with no live draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Draft,
    Approved,
    Published,
    Rejected,
}

impl PostStatus {
    /// Stable string form used in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Approved => "approved",
            Self::Published => "published",
            Self::Rejected => "rejected",
        }
    }

    /// Whether moving from `self` to `to` is a legal transition.
    pub fn can_transition_to(&self, to: PostStatus) -> bool {
        matches!(
            (self, to),
            (Self::Draft, Self::Approved)
                | (Self::Draft, Self::Rejected)
                | (Self::Approved, Self::Published)
                | (Self::Approved, Self::Draft)
        )
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "approved" => Ok(Self::Approved),
            "published" => Ok(Self::Published),
            "rejected" => Ok(Self::Rejected),
            other => Err(Error::Validation(format!("unknown post status: {other}"))),
        }
    }
}

/// Content type of a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Single,
    Carousel,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Carousel => "carousel",
        }
    }
}

impl FromStr for ContentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(Self::Single),
            "carousel" => Ok(Self::Carousel),
            other => Err(Error::Validation(format!("unknown content type: {other}"))),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Posts
// ═══════════════════════════════════════════════════════════════════════════

/// A schedulable content unit as stored in the `posts` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    /// Opaque post id (UUID v4).
    pub id: String,
    /// Deterministic hash of platform + ordered media + caption.
    /// Unique among non-rejected posts.
    pub content_hash: String,
    pub content_type: ContentType,
    pub platform: Platform,
    pub caption: String,
    pub hashtags: Vec<String>,
    /// Ordered media URLs or paths.
    pub media_urls: Vec<String>,
    pub thumbnail_url: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub status: PostStatus,
    /// Remote profile id → external draft id, attached once drafts exist.
    pub draft_ids: BTreeMap<String, String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when creating a post; the store fills in id, hash,
/// status, and timestamps.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub content_type: ContentType,
    pub platform: Platform,
    pub caption: String,
    pub hashtags: Vec<String>,
    pub media_urls: Vec<String>,
    pub thumbnail_url: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl Post {
    /// Build a fresh `Draft` post from its input fields.
    pub fn from_new(new: NewPost) -> Self {
        let now = Utc::now();
        let hash = content_hash(new.platform, &new.media_urls, &new.caption);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content_hash: hash,
            content_type: new.content_type,
            platform: new.platform,
            caption: new.caption,
            hashtags: new.hashtags,
            media_urls: new.media_urls,
            thumbnail_url: new.thumbnail_url,
            scheduled_at: new.scheduled_at,
            status: PostStatus::Draft,
            draft_ids: BTreeMap::new(),
            approved_at: None,
            approved_by: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Deterministic content digest used for deduplication.
///
/// Hashes the platform, the media list in order, and the caption. Two
/// posts with identical content for the same platform always collide,
/// regardless of when or by which job they were created.
pub fn content_hash(platform: Platform, media: &[String], caption: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(platform.as_str().as_bytes());
    hasher.update([0u8]);
    for url in media {
        hasher.update(url.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(caption.as_bytes());
    hex::encode(hasher.finalize())
}

// ═══════════════════════════════════════════════════════════════════════════
// Approvals
// ═══════════════════════════════════════════════════════════════════════════

/// The action recorded by an approval row and signed into webhook links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Approve,
    Reject,
}

impl ApprovalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

impl fmt::Display for ApprovalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            other => Err(Error::Validation(format!("unknown action: {other}"))),
        }
    }
}

/// Immutable audit record of one approve/reject action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    pub id: i64,
    pub post_id: String,
    pub action: ApprovalAction,
    pub actor: String,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Carousels
// ═══════════════════════════════════════════════════════════════════════════

/// A multi-image post aggregate with ordered items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Carousel {
    pub id: String,
    pub platform: Platform,
    pub status: PostStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub caption: String,
    pub cta: Option<String>,
    /// Content hash; UNIQUE in the store for idempotent planner re-runs.
    pub hash: String,
}

/// One media item within a carousel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarouselItem {
    pub id: i64,
    pub carousel_id: String,
    pub media_path: String,
    /// Zero-based position within the carousel.
    pub position: u32,
    /// Optional per-item sidecar metadata.
    pub sidecar: Option<serde_json::Value>,
}

/// Append-only usage tracking for duplicate-avoidance heuristics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarouselUsageRecord {
    pub id: i64,
    pub carousel_hash: String,
    pub theme: String,
    pub platform: Platform,
    pub used_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════════
// Metrics
// ═══════════════════════════════════════════════════════════════════════════

/// One harvested metrics snapshot for a post. Historical rows are kept,
/// so (post_id) is deliberately not unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostMetrics {
    pub id: i64,
    pub post_id: String,
    pub platform: Platform,
    pub metrics: serde_json::Value,
    pub fetched_at: DateTime<Utc>,
}
