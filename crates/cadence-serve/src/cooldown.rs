//! Per-post action cooldown.
//!
//! A bounded moka cache keyed by post id. An entry means the post was
//! actioned within the cooldown window, so a second click on the same
//! digest link gets a 429 instead of a duplicate state transition. The
//! cache is owned by the application state rather than living in a
//! process global, so each server instance (and each test) gets its own.

use std::time::Duration;

use moka::sync::Cache;

/// Upper bound on tracked posts; far above any realistic pending set.
const COOLDOWN_CAPACITY: u64 = 10_000;

#[derive(Clone)]
pub struct Cooldown {
    cache: Cache<String, ()>,
}

impl Cooldown {
    /// Build a cooldown cache whose entries expire after `window`.
    pub fn new(window: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(COOLDOWN_CAPACITY)
                .time_to_live(window)
                .build(),
        }
    }

    /// Record an action on a post. Returns false when the post is still
    /// inside its cooldown window.
    ///
    /// The check-then-insert is not atomic; a true race between two
    /// requests is resolved by the store's conditional status update, the
    /// cooldown only absorbs accidental double clicks.
    pub fn try_acquire(&self, post_id: &str) -> bool {
        if self.cache.contains_key(post_id) {
            return false;
        }
        self.cache.insert(post_id.to_string(), ());
        metrics::gauge!("webhook_cooldown_entries").set(self.cache.entry_count() as f64);
        true
    }
}
