//! Cadence content pipeline.
//!
//! Everything between the media tree and the remote publisher lives
//! here: the SQLite store, the publisher API client, the posting-time
//! planner, the carousel asset planner, the publish orchestrator, and
//! the scheduled job runner.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   Media tree    │  (asset paths from a shoot export)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CarouselPlanner │  Groups assets, schedules via Planner slots
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │      Store      │  SQLite - posts, carousels, approvals, metrics
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │    Publisher    │  Drafts, publishes, and harvests via BufferClient
//! └─────────────────┘
//! ```
//!
//! The store is the source of truth: the remote publisher only ever
//! holds drafts derived from it, and stats flow back in as snapshots.

pub mod buffer;
pub mod carousel;
pub mod jobs;
pub mod planner;
pub mod publisher;
pub mod store;

// Re-export commonly used types at crate root
pub use buffer::{BufferClient, BufferConfig, Profile, PublisherApi};
pub use carousel::{AssetGroup, CarouselPlanner, Grouping};
pub use jobs::{JobConfig, JobRunner};
pub use planner::{Planner, PlannerConfig, QuietHours, Slot};
pub use publisher::{DraftOutcome, Publisher};
pub use store::Store;
