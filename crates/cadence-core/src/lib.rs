//! Core types, validation, and shared utilities for the Cadence scheduling pipeline.
//!
//! This crate provides:
//! - Post, carousel, and approval value types with the status state machine
//! - Content hashing for idempotent ingestion
//! - The retry policy and classification used by the publisher API client
//! - HMAC signing for approval links
//! - Prometheus metrics helpers
//! - Shared error types

mod error;
mod model;
pub mod metrics;
pub mod retry;
pub mod signing;

// ═══════════════════════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════════════════════

/// Hard ceiling on carousel items imposed by the publisher API.
/// Platform-specific bounds may be tighter, but never looser than this.
pub const MAX_CAROUSEL_ITEMS: usize = 10;

/// Default bounded timeout for external publisher API calls.
pub const API_TIMEOUT_SECS: u64 = 15;

pub use error::{Error, Result};
pub use model::{
    content_hash, Approval, ApprovalAction, Carousel, CarouselBounds, CarouselItem,
    CarouselUsageRecord, ContentType, NewPost, Platform, Post, PostMetrics, PostStatus,
};
