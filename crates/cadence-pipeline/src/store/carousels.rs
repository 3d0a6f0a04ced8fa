//! Carousel, usage-tracking, and metrics persistence.

use std::str::FromStr;

use chrono::{DateTime, Utc};

use cadence_core::{
    Carousel, CarouselItem, CarouselUsageRecord, Platform, PostMetrics, PostStatus, Result,
};

use super::{db_err, ts_to_datetime, Store};

impl Store {
    /// Insert a carousel and its ordered items in one transaction.
    ///
    /// A duplicate carousel hash rolls the whole transaction back and
    /// surfaces as [`cadence_core::Error::Conflict`].
    pub fn insert_carousel(&self, carousel: &Carousel, media_paths: &[String]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;

        tx.execute(
            "INSERT INTO carousels (id, platform, status, scheduled_at, caption, cta, hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                carousel.id,
                carousel.platform.as_str(),
                carousel.status.as_str(),
                carousel.scheduled_at.map(|t| t.timestamp()),
                carousel.caption,
                carousel.cta,
                carousel.hash,
            ],
        )
        .map_err(db_err)?;

        for (position, path) in media_paths.iter().enumerate() {
            tx.execute(
                "INSERT INTO carousel_items (carousel_id, media_path, position)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![carousel.id, path, position as u32],
            )
            .map_err(db_err)?;
        }

        tx.commit().map_err(db_err)
    }

    /// Fetch a carousel's items in position order.
    pub fn carousel_items(&self, carousel_id: &str) -> Result<Vec<CarouselItem>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, carousel_id, media_path, position, sidecar_json
                 FROM carousel_items WHERE carousel_id = ? ORDER BY position ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([carousel_id], |row| {
                let sidecar_raw: Option<String> = row.get(4)?;
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, u32>(3)?,
                    sidecar_raw,
                ))
            })
            .map_err(db_err)?;

        let mut items = Vec::new();
        for row in rows {
            let (id, carousel_id, media_path, position, sidecar_raw) = row.map_err(db_err)?;
            let sidecar = match sidecar_raw {
                Some(raw) => Some(serde_json::from_str(&raw)?),
                None => None,
            };
            items.push(CarouselItem {
                id,
                carousel_id,
                media_path,
                position,
                sidecar,
            });
        }
        Ok(items)
    }

    /// Whether a carousel with this content hash already exists.
    pub fn carousel_exists(&self, hash: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM carousels WHERE hash = ?",
                [hash],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count > 0)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Usage tracking
    // ═══════════════════════════════════════════════════════════════════

    /// Append a usage record for duplicate-avoidance heuristics.
    pub fn record_carousel_usage(
        &self,
        carousel_hash: &str,
        theme: &str,
        platform: Platform,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO carousel_usage (carousel_hash, theme, platform, used_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![carousel_hash, theme, platform.as_str(), Utc::now().timestamp()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Most recent usage records for a platform, newest first.
    pub fn recent_carousel_usage(
        &self,
        platform: Platform,
        limit: u32,
    ) -> Result<Vec<CarouselUsageRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, carousel_hash, theme, platform, used_at
                 FROM carousel_usage WHERE platform = ?1
                 ORDER BY used_at DESC, id DESC LIMIT ?2",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(rusqlite::params![platform.as_str(), limit], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })
            .map_err(db_err)?;

        let mut records = Vec::new();
        for row in rows {
            let (id, carousel_hash, theme, platform_raw, used_at) = row.map_err(db_err)?;
            records.push(CarouselUsageRecord {
                id,
                carousel_hash,
                theme,
                platform: Platform::from_str(&platform_raw)?,
                used_at: ts_to_datetime(used_at),
            });
        }
        Ok(records)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Harvested metrics
    // ═══════════════════════════════════════════════════════════════════

    /// Append one metrics snapshot for a post.
    pub fn insert_metrics(
        &self,
        post_id: &str,
        platform: Platform,
        metrics: &serde_json::Value,
    ) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO post_metrics (post_id, platform, metrics, fetched_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                post_id,
                platform.as_str(),
                serde_json::to_string(metrics)?,
                Utc::now().timestamp()
            ],
        )
        .map_err(db_err)?;
        Ok(conn.last_insert_rowid())
    }

    /// The metrics history for a post, oldest snapshot first.
    pub fn metrics_for_post(&self, post_id: &str) -> Result<Vec<PostMetrics>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, post_id, platform, metrics, fetched_at
                 FROM post_metrics WHERE post_id = ? ORDER BY fetched_at ASC, id ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([post_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })
            .map_err(db_err)?;

        let mut snapshots = Vec::new();
        for row in rows {
            let (id, post_id, platform_raw, metrics_raw, fetched_at) = row.map_err(db_err)?;
            snapshots.push(PostMetrics {
                id,
                post_id,
                platform: Platform::from_str(&platform_raw)?,
                metrics: serde_json::from_str(&metrics_raw)?,
                fetched_at: ts_to_datetime(fetched_at),
            });
        }
        Ok(snapshots)
    }
}

/// Build a fresh carousel aggregate in `Draft` status.
pub fn new_carousel(
    platform: Platform,
    caption: String,
    cta: Option<String>,
    hash: String,
    scheduled_at: Option<DateTime<Utc>>,
) -> Carousel {
    Carousel {
        id: uuid::Uuid::new_v4().to_string(),
        platform,
        status: PostStatus::Draft,
        scheduled_at,
        caption,
        cta,
        hash,
    }
}
