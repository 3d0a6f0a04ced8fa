//! Embedded SQLite content store.
//!
//! The `Store` exclusively owns persisted state: posts, approvals,
//! carousels, usage tracking, and harvested metrics. Other components
//! hold only ids and re-read status before every transition, so nothing
//! acts on a stale snapshot.
//!
//! Writes are transactional at the single-row level (carousel inserts use
//! an explicit transaction for the parent+items pair). WAL journal mode
//! keeps readers unblocked by the single writer. Constraint violations
//! surface as [`Error::Conflict`], distinct from I/O errors, because
//! callers treat them as expected idempotent skips.

mod carousels;
pub mod schema;

pub use carousels::new_carousel;

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};

use cadence_core::{
    Approval, ApprovalAction, ContentType, Error, NewPost, Platform, Post, PostStatus, Result,
};

/// SQLite-backed store for all Cadence state.
pub struct Store {
    /// SQLite connection (protected by mutex for thread safety).
    conn: Mutex<Connection>,
}

impl Store {
    /// Open or create the store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path.as_ref())
            .map_err(|e| Error::Database(format!("Failed to open SQLite: {}", e)))?;
        Self::init(conn)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("Failed to open in-memory SQLite: {}", e)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        // WAL mode keeps reads unblocked by the writer
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )
        .map_err(|e| Error::Database(format!("Failed to set PRAGMA: {}", e)))?;

        schema::init_schema(&conn)
            .map_err(|e| Error::Database(format!("Failed to init schema: {}", e)))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ═══════════════════════════════════════════════════════════════════
    // Posts
    // ═══════════════════════════════════════════════════════════════════

    /// Insert a new post in `Draft` status.
    ///
    /// A duplicate content hash among live posts returns
    /// [`Error::Conflict`]; planner jobs rely on this for idempotent
    /// re-runs over an unchanged media tree.
    pub fn insert_post(&self, new: NewPost) -> Result<Post> {
        let post = Post::from_new(new);
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO posts (id, content_hash, content_type, platform, status, caption,
                                hashtags, media_urls, thumbnail_url, scheduled_at,
                                buffer_draft_ids, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            rusqlite::params![
                post.id,
                post.content_hash,
                post.content_type.as_str(),
                post.platform.as_str(),
                post.status.as_str(),
                post.caption,
                serde_json::to_string(&post.hashtags)?,
                serde_json::to_string(&post.media_urls)?,
                post.thumbnail_url,
                post.scheduled_at.map(|t| t.timestamp()),
                serde_json::to_string(&post.draft_ids)?,
                post.created_at.timestamp(),
                post.updated_at.timestamp(),
            ],
        )
        .map_err(db_err)?;
        Ok(post)
    }

    /// Fetch a post by id.
    pub fn get_post(&self, id: &str) -> Result<Option<Post>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?"),
            [id],
            row_to_post,
        )
        .optional()
        .map_err(db_err)
    }

    /// List posts in a status, oldest scheduled first.
    pub fn list_by_status(&self, status: PostStatus, limit: u32) -> Result<Vec<Post>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {POST_COLUMNS} FROM posts WHERE status = ?1
                 ORDER BY scheduled_at ASC, created_at ASC LIMIT ?2"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(rusqlite::params![status.as_str(), limit], row_to_post)
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// List posts in a status whose scheduled time has passed.
    pub fn list_due(&self, status: PostStatus, now: DateTime<Utc>) -> Result<Vec<Post>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {POST_COLUMNS} FROM posts
                 WHERE status = ?1 AND scheduled_at IS NOT NULL AND scheduled_at <= ?2
                 ORDER BY scheduled_at ASC"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(
                rusqlite::params![status.as_str(), now.timestamp()],
                row_to_post,
            )
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Whether a live (non-rejected) post exists with this content hash.
    pub fn exists_by_content_hash(&self, hash: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM posts WHERE content_hash = ? AND status != 'rejected'",
                [hash],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count > 0)
    }

    /// Conditionally transition a post's status.
    ///
    /// The UPDATE is guarded by `WHERE id = ? AND status = ?`, so of two
    /// near-simultaneous callers exactly one wins; the loser sees
    /// [`Error::Conflict`] and must not run side effects. Illegal
    /// transitions are refused before touching the database.
    ///
    /// When `to` is `Approved`, `actor` is stamped into
    /// `approved_at`/`approved_by`.
    pub fn transition_status(
        &self,
        id: &str,
        from: PostStatus,
        to: PostStatus,
        actor: Option<&str>,
    ) -> Result<()> {
        if !from.can_transition_to(to) {
            return Err(Error::InvalidTransition { from, to });
        }

        let now = Utc::now().timestamp();
        let conn = self.conn.lock();
        let changed = if to == PostStatus::Approved {
            conn.execute(
                "UPDATE posts SET status = ?1, approved_at = ?2, approved_by = ?3, updated_at = ?2
                 WHERE id = ?4 AND status = ?5",
                rusqlite::params![to.as_str(), now, actor, id, from.as_str()],
            )
        } else {
            conn.execute(
                "UPDATE posts SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
                rusqlite::params![to.as_str(), now, id, from.as_str()],
            )
        }
        .map_err(db_err)?;

        if changed == 1 {
            return Ok(());
        }

        // Distinguish a missing row from a lost race
        let current: Option<String> = conn
            .query_row("SELECT status FROM posts WHERE id = ?", [id], |row| {
                row.get(0)
            })
            .optional()
            .map_err(db_err)?;
        match current {
            None => Err(Error::NotFound(format!("post {id}"))),
            Some(actual) => Err(Error::Conflict(format!(
                "post {id} is {actual}, expected {from}"
            ))),
        }
    }

    /// Attach external draft ids returned by the publisher API.
    pub fn set_draft_ids(&self, id: &str, draft_ids: &BTreeMap<String, String>) -> Result<()> {
        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "UPDATE posts SET buffer_draft_ids = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![
                    serde_json::to_string(draft_ids)?,
                    Utc::now().timestamp(),
                    id
                ],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(Error::NotFound(format!("post {id}")));
        }
        Ok(())
    }

    /// Delete a post; approvals and metrics rows cascade.
    pub fn delete_post(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn
            .execute("DELETE FROM posts WHERE id = ?", [id])
            .map_err(db_err)?;
        Ok(changed > 0)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Approvals
    // ═══════════════════════════════════════════════════════════════════

    /// Append an approval audit row.
    pub fn record_approval(
        &self,
        post_id: &str,
        action: ApprovalAction,
        actor: &str,
        comment: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO approvals (post_id, action, actor, comment, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![post_id, action.as_str(), actor, comment, Utc::now().timestamp()],
        )
        .map_err(db_err)?;
        Ok(conn.last_insert_rowid())
    }

    /// The audit trail for a post, oldest first.
    pub fn approvals_for_post(&self, post_id: &str) -> Result<Vec<Approval>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, post_id, action, actor, comment, created_at
                 FROM approvals WHERE post_id = ? ORDER BY created_at ASC, id ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([post_id], |row| {
                Ok(RawApproval {
                    id: row.get(0)?,
                    post_id: row.get(1)?,
                    action: row.get(2)?,
                    actor: row.get(3)?,
                    comment: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?
            .into_iter()
            .map(RawApproval::into_approval)
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Row mapping
// ═══════════════════════════════════════════════════════════════════════════

const POST_COLUMNS: &str = "id, content_hash, content_type, platform, status, caption, hashtags, \
                            media_urls, thumbnail_url, scheduled_at, buffer_draft_ids, \
                            approved_at, approved_by, created_at, updated_at";

/// Map a rusqlite error onto the crate taxonomy. Constraint violations
/// become typed conflicts; everything else is a database error.
pub(crate) fn db_err(e: rusqlite::Error) -> Error {
    match &e {
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Error::Conflict(e.to_string())
        }
        _ => Error::Database(e.to_string()),
    }
}

pub(crate) fn ts_to_datetime(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

fn row_to_post(row: &rusqlite::Row<'_>) -> rusqlite::Result<Post> {
    // Parse failures in persisted enums/JSON indicate a corrupted row;
    // map them onto rusqlite's conversion error so query_map surfaces them.
    fn bad<T>(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Result<T> {
        Err(rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(err),
        ))
    }

    let content_type_raw: String = row.get(2)?;
    let platform_raw: String = row.get(3)?;
    let status_raw: String = row.get(4)?;
    let hashtags_raw: String = row.get(6)?;
    let media_raw: String = row.get(7)?;
    let draft_ids_raw: String = row.get(10)?;

    let content_type = match ContentType::from_str(&content_type_raw) {
        Ok(v) => v,
        Err(e) => return bad(2, e),
    };
    let platform = match Platform::from_str(&platform_raw) {
        Ok(v) => v,
        Err(e) => return bad(3, e),
    };
    let status = match PostStatus::from_str(&status_raw) {
        Ok(v) => v,
        Err(e) => return bad(4, e),
    };
    let hashtags: Vec<String> = match serde_json::from_str(&hashtags_raw) {
        Ok(v) => v,
        Err(e) => return bad(6, e),
    };
    let media_urls: Vec<String> = match serde_json::from_str(&media_raw) {
        Ok(v) => v,
        Err(e) => return bad(7, e),
    };
    let draft_ids: BTreeMap<String, String> = match serde_json::from_str(&draft_ids_raw) {
        Ok(v) => v,
        Err(e) => return bad(10, e),
    };

    Ok(Post {
        id: row.get(0)?,
        content_hash: row.get(1)?,
        content_type,
        platform,
        status,
        caption: row.get(5)?,
        hashtags,
        media_urls,
        thumbnail_url: row.get(8)?,
        scheduled_at: row.get::<_, Option<i64>>(9)?.map(ts_to_datetime),
        draft_ids,
        approved_at: row.get::<_, Option<i64>>(11)?.map(ts_to_datetime),
        approved_by: row.get(12)?,
        created_at: ts_to_datetime(row.get(13)?),
        updated_at: ts_to_datetime(row.get(14)?),
    })
}

struct RawApproval {
    id: i64,
    post_id: String,
    action: String,
    actor: String,
    comment: Option<String>,
    created_at: i64,
}

impl RawApproval {
    fn into_approval(self) -> Result<Approval> {
        Ok(Approval {
            id: self.id,
            post_id: self.post_id,
            action: ApprovalAction::from_str(&self.action)?,
            actor: self.actor,
            comment: self.comment,
            created_at: ts_to_datetime(self.created_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_post(caption: &str) -> NewPost {
        NewPost {
            content_type: ContentType::Single,
            platform: Platform::Instagram,
            caption: caption.to_string(),
            hashtags: vec!["#test".to_string()],
            media_urls: vec!["a.jpg".to_string(), "b.jpg".to_string()],
            thumbnail_url: None,
            scheduled_at: Some(Utc::now()),
        }
    }

    #[test]
    fn test_insert_and_get_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let inserted = store.insert_post(new_post("hello")).unwrap();

        let fetched = store.get_post(&inserted.id).unwrap().unwrap();
        assert_eq!(fetched.caption, "hello");
        assert_eq!(fetched.status, PostStatus::Draft);
        assert_eq!(fetched.hashtags, vec!["#test"]);
        assert_eq!(fetched.media_urls, vec!["a.jpg", "b.jpg"]);
        assert_eq!(fetched.content_hash, inserted.content_hash);
    }

    #[test]
    fn test_duplicate_content_hash_is_conflict() {
        let store = Store::open_in_memory().unwrap();
        store.insert_post(new_post("same")).unwrap();
        let err = store.insert_post(new_post("same")).unwrap_err();
        assert!(err.is_conflict(), "expected conflict, got {err}");
    }

    #[test]
    fn test_rejected_post_frees_its_hash() {
        let store = Store::open_in_memory().unwrap();
        let post = store.insert_post(new_post("reusable")).unwrap();
        store
            .transition_status(&post.id, PostStatus::Draft, PostStatus::Rejected, None)
            .unwrap();
        assert!(!store.exists_by_content_hash(&post.content_hash).unwrap());
        store.insert_post(new_post("reusable")).unwrap();
    }

    #[test]
    fn test_conditional_transition_single_winner() {
        let store = Store::open_in_memory().unwrap();
        let post = store.insert_post(new_post("race")).unwrap();

        store
            .transition_status(&post.id, PostStatus::Draft, PostStatus::Approved, Some("alex"))
            .unwrap();
        // Second caller loses the race and gets a conflict
        let err = store
            .transition_status(&post.id, PostStatus::Draft, PostStatus::Approved, Some("sam"))
            .unwrap_err();
        assert!(err.is_conflict());

        let current = store.get_post(&post.id).unwrap().unwrap();
        assert_eq!(current.status, PostStatus::Approved);
        assert_eq!(current.approved_by.as_deref(), Some("alex"));
        assert!(current.approved_at.is_some());
    }

    #[test]
    fn test_illegal_transition_refused_without_mutation() {
        let store = Store::open_in_memory().unwrap();
        let post = store.insert_post(new_post("legal")).unwrap();

        let err = store
            .transition_status(&post.id, PostStatus::Draft, PostStatus::Published, None)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(
            store.get_post(&post.id).unwrap().unwrap().status,
            PostStatus::Draft
        );
    }

    #[test]
    fn test_transition_missing_post_is_not_found() {
        let store = Store::open_in_memory().unwrap();
        let err = store
            .transition_status("nope", PostStatus::Draft, PostStatus::Approved, None)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_publish_failure_revert_reappears_in_draft_listing() {
        let store = Store::open_in_memory().unwrap();
        let post = store.insert_post(new_post("revert me")).unwrap();
        store
            .transition_status(&post.id, PostStatus::Draft, PostStatus::Approved, Some("alex"))
            .unwrap();
        store
            .transition_status(&post.id, PostStatus::Approved, PostStatus::Draft, None)
            .unwrap();

        let drafts = store.list_by_status(PostStatus::Draft, 10).unwrap();
        assert!(drafts.iter().any(|p| p.id == post.id));
    }

    #[test]
    fn test_set_and_read_draft_ids() {
        let store = Store::open_in_memory().unwrap();
        let post = store.insert_post(new_post("drafts")).unwrap();

        let mut ids = BTreeMap::new();
        ids.insert("profile-1".to_string(), "draft-abc".to_string());
        ids.insert("profile-2".to_string(), "draft-def".to_string());
        store.set_draft_ids(&post.id, &ids).unwrap();

        let fetched = store.get_post(&post.id).unwrap().unwrap();
        assert_eq!(fetched.draft_ids, ids);
    }

    #[test]
    fn test_list_due_only_returns_past_scheduled() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();

        let mut due = new_post("due");
        due.scheduled_at = Some(now - chrono::Duration::hours(1));
        let due = store.insert_post(due).unwrap();
        store
            .transition_status(&due.id, PostStatus::Draft, PostStatus::Approved, Some("a"))
            .unwrap();

        let mut future = new_post("future");
        future.scheduled_at = Some(now + chrono::Duration::hours(1));
        let future = store.insert_post(future).unwrap();
        store
            .transition_status(&future.id, PostStatus::Draft, PostStatus::Approved, Some("a"))
            .unwrap();

        let listed = store.list_due(PostStatus::Approved, now).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, due.id);
    }

    #[test]
    fn test_approval_audit_trail() {
        let store = Store::open_in_memory().unwrap();
        let post = store.insert_post(new_post("audited")).unwrap();

        store
            .record_approval(&post.id, ApprovalAction::Approve, "alex", Some("looks good"))
            .unwrap();
        let trail = store.approvals_for_post(&post.id).unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, ApprovalAction::Approve);
        assert_eq!(trail[0].actor, "alex");
        assert_eq!(trail[0].comment.as_deref(), Some("looks good"));
    }

    #[test]
    fn test_delete_cascades_approvals() {
        let store = Store::open_in_memory().unwrap();
        let post = store.insert_post(new_post("doomed")).unwrap();
        store
            .record_approval(&post.id, ApprovalAction::Reject, "alex", None)
            .unwrap();

        assert!(store.delete_post(&post.id).unwrap());
        assert!(store.get_post(&post.id).unwrap().is_none());
        assert!(store.approvals_for_post(&post.id).unwrap().is_empty());
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cadence.db");
        {
            let store = Store::open(&path).unwrap();
            store.insert_post(new_post("persisted")).unwrap();
        }
        let reopened = Store::open(&path).unwrap();
        assert_eq!(reopened.list_by_status(PostStatus::Draft, 10).unwrap().len(), 1);
    }
}
