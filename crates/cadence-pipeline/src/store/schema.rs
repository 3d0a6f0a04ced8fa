//! SQLite schema for the Cadence content store.
//!
//! This module defines the database schema and provides migration utilities.
//! Foreign keys cascade so deleting a post or carousel removes its child
//! rows (approvals, carousel items) in the same statement.

use rusqlite::{Connection, Result};

/// Current schema version. Increment when making breaking changes.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
///
/// Creates all tables if they don't exist and runs any pending migrations.
pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        migrate(conn, current_version, SCHEMA_VERSION)?;
    }

    Ok(())
}

/// Get the current schema version (0 if not initialized).
fn get_schema_version(conn: &Connection) -> Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )",
        [],
    )?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();

    Ok(version.unwrap_or(0))
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])?;
    Ok(())
}

/// Create all tables for a fresh database.
fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Schedulable content units
        CREATE TABLE IF NOT EXISTS posts (
            id TEXT PRIMARY KEY,
            content_hash TEXT NOT NULL,
            content_type TEXT NOT NULL,
            platform TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'draft',
            caption TEXT NOT NULL,
            hashtags TEXT NOT NULL DEFAULT '[]',
            media_urls TEXT NOT NULL DEFAULT '[]',
            thumbnail_url TEXT,
            scheduled_at INTEGER,
            buffer_draft_ids TEXT NOT NULL DEFAULT '{}',
            approved_at INTEGER,
            approved_by TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Approval audit trail (append-only)
        CREATE TABLE IF NOT EXISTS approvals (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            post_id TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
            action TEXT NOT NULL,
            actor TEXT NOT NULL,
            comment TEXT,
            created_at INTEGER NOT NULL
        );

        -- Carousel aggregates
        CREATE TABLE IF NOT EXISTS carousels (
            id TEXT PRIMARY KEY,
            platform TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'draft',
            scheduled_at INTEGER,
            caption TEXT NOT NULL,
            cta TEXT,
            hash TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS carousel_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            carousel_id TEXT NOT NULL REFERENCES carousels(id) ON DELETE CASCADE,
            media_path TEXT NOT NULL,
            position INTEGER NOT NULL,
            sidecar_json TEXT
        );

        -- Usage tracking for duplicate-avoidance heuristics (append-only)
        CREATE TABLE IF NOT EXISTS carousel_usage (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            carousel_hash TEXT NOT NULL,
            theme TEXT NOT NULL,
            platform TEXT NOT NULL,
            used_at INTEGER NOT NULL
        );

        -- Harvested per-post metrics snapshots (historical series retained)
        CREATE TABLE IF NOT EXISTS post_metrics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            post_id TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
            platform TEXT NOT NULL,
            metrics TEXT NOT NULL,
            fetched_at INTEGER NOT NULL
        );

        -- Content hash uniqueness applies to live posts only; a rejected
        -- post may be recreated with the same content.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_posts_live_hash
            ON posts(content_hash) WHERE status != 'rejected';

        -- Indexes for the sweep and listing query patterns
        CREATE INDEX IF NOT EXISTS idx_posts_platform_status_sched
            ON posts(platform, status, scheduled_at);
        CREATE INDEX IF NOT EXISTS idx_posts_status ON posts(status);
        CREATE INDEX IF NOT EXISTS idx_approvals_post ON approvals(post_id);
        CREATE INDEX IF NOT EXISTS idx_carousel_items_carousel
            ON carousel_items(carousel_id);
        CREATE INDEX IF NOT EXISTS idx_carousel_usage_hash
            ON carousel_usage(carousel_hash);
        CREATE INDEX IF NOT EXISTS idx_carousel_usage_recency
            ON carousel_usage(platform, used_at DESC);
        CREATE INDEX IF NOT EXISTS idx_post_metrics_post
            ON post_metrics(post_id, fetched_at);
        "#,
    )
}

/// Run migrations from one version to another.
fn migrate(conn: &Connection, from: i32, to: i32) -> Result<()> {
    tracing::info!("Migrating store schema from v{} to v{}", from, to);
    // No migrations yet; v1 is the initial schema.
    let _ = conn;
    Ok(())
}
