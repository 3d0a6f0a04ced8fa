//! Carousel asset planning.
//!
//! Groups raw media paths into valid carousel posts and persists them
//! idempotently. Grouping is keyed by a project name derived from the
//! path: generic directory names are skipped, a hyphen- or
//! underscore-bearing segment is preferred, and the parent directory is
//! the fallback. Within a group, items sort by leading numeric token
//! with a lexicographic fallback so the order is identical no matter how
//! the filesystem walk happened to return the files.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use cadence_core::{
    content_hash, CarouselBounds, ContentType, NewPost, Platform, Post, Result,
    MAX_CAROUSEL_ITEMS,
};

use crate::store::{new_carousel, Store};

/// Directory names that say nothing about the project an asset belongs to.
const GENERIC_DIRS: &[&str] = &[
    "images", "image", "img", "photos", "photo", "pics", "media", "assets", "export", "exports",
    "raw", "final", "finals", "edited", "output", "uploads", "upload", "content", "files", "new",
    "misc", "temp", "tmp",
];

/// Target size when splitting an oversized-but-under-ceiling group.
const SPLIT_TARGET: usize = 3;

/// One planned carousel: ordered media paths plus their derived theme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetGroup {
    /// Human-readable theme derived from the project segment.
    pub theme: String,
    /// Stable short hash of the project key.
    pub key: String,
    /// Media paths in final carousel order.
    pub paths: Vec<String>,
}

/// Result of grouping a media tree.
#[derive(Debug, Clone, Default)]
pub struct Grouping {
    /// Valid carousel groups.
    pub groups: Vec<AssetGroup>,
    /// Single-post candidates (project keys with one asset, or split
    /// remainders below the minimum).
    pub ungrouped: Vec<String>,
}

/// Plans carousels for one platform.
#[derive(Debug, Clone)]
pub struct CarouselPlanner {
    platform: Platform,
    bounds: CarouselBounds,
}

impl CarouselPlanner {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            bounds: platform.carousel_bounds(),
        }
    }

    /// Group asset paths into valid carousels.
    ///
    /// Size rules per project key (deduplicated paths):
    /// - 1 asset: ungrouped (single-post candidate)
    /// - within [min, max]: one group
    /// - (max, ceiling]: sub-groups of [`SPLIT_TARGET`], remainder
    ///   absorbed into the final sub-group when it would undershoot min
    /// - over the ceiling: max-sized chunks, each re-validated; a
    ///   too-small tail chunk is routed to ungrouped
    pub fn group_assets(&self, paths: &[String]) -> Grouping {
        // BTreeMap keys give deterministic project iteration order; the
        // inner set drops repeated paths before any ordering happens.
        let mut projects: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for path in paths {
            projects
                .entry(project_key(path))
                .or_default()
                .insert(path.clone());
        }

        let mut grouping = Grouping::default();
        for (project, members) in projects {
            let mut members: Vec<String> = members.into_iter().collect();
            members.sort_by(numeric_then_lexicographic);

            let theme = humanize(&project);
            let key = short_hash(&project);

            match members.len() {
                0 => {}
                1 => grouping.ungrouped.extend(members),
                n if n < self.bounds.min => grouping.ungrouped.extend(members),
                n if n <= self.bounds.max => grouping.groups.push(AssetGroup {
                    theme,
                    key,
                    paths: members,
                }),
                n if n <= MAX_CAROUSEL_ITEMS => {
                    self.split_with_target(&theme, &key, members, &mut grouping)
                }
                _ => self.split_by_max(&theme, &key, members, &mut grouping),
            }
        }
        if !grouping.ungrouped.is_empty() {
            metrics::counter!("planner_ungrouped_assets_total")
                .increment(grouping.ungrouped.len() as u64);
        }
        grouping
    }

    /// Split a group in (max, ceiling] into sub-groups of [`SPLIT_TARGET`].
    fn split_with_target(
        &self,
        theme: &str,
        key: &str,
        members: Vec<String>,
        out: &mut Grouping,
    ) {
        let mut chunks: Vec<Vec<String>> = members
            .chunks(SPLIT_TARGET)
            .map(|c| c.to_vec())
            .collect();

        // Absorb a too-small remainder into the final sub-group
        if chunks.len() > 1 {
            let last = chunks.last().map(Vec::len).unwrap_or(0);
            if last < self.bounds.min {
                let tail = chunks.pop().unwrap_or_default();
                if let Some(prev) = chunks.last_mut() {
                    prev.extend(tail);
                }
            }
        }

        for (i, chunk) in chunks.into_iter().enumerate() {
            out.groups.push(AssetGroup {
                theme: theme.to_string(),
                key: format!("{key}-{i}"),
                paths: chunk,
            });
        }
    }

    /// Split a group above the API ceiling into max-sized chunks.
    fn split_by_max(&self, theme: &str, key: &str, members: Vec<String>, out: &mut Grouping) {
        for (i, chunk) in members.chunks(self.bounds.max).enumerate() {
            if chunk.len() < self.bounds.min {
                out.ungrouped.extend(chunk.iter().cloned());
            } else {
                out.groups.push(AssetGroup {
                    theme: theme.to_string(),
                    key: format!("{key}-{i}"),
                    paths: chunk.to_vec(),
                });
            }
        }
    }

    /// Deterministic template caption for a group.
    pub fn caption_for(&self, group: &AssetGroup) -> String {
        format!(
            "{}: {} frames, swipe through.",
            group.theme,
            group.paths.len()
        )
    }

    /// Persist planned groups as carousel + post rows.
    ///
    /// `scheduled_times` are consumed in order, one per group. A content
    /// hash that already exists in the store is an expected idempotent
    /// skip, so re-running the planner over an unchanged media tree
    /// creates nothing new.
    pub fn create_carousel_posts(
        &self,
        store: &Store,
        groups: &[AssetGroup],
        scheduled_times: &[DateTime<Utc>],
    ) -> Result<Vec<Post>> {
        let mut created = Vec::new();
        for (group, scheduled_at) in groups.iter().zip(scheduled_times.iter()) {
            let caption = self.caption_for(group);
            let hash = content_hash(self.platform, &group.paths, &caption);

            if store.exists_by_content_hash(&hash)? || store.carousel_exists(&hash)? {
                tracing::debug!(theme = %group.theme, "carousel already planned, skipping");
                metrics::counter!("planner_duplicates_skipped_total").increment(1);
                continue;
            }

            let carousel = new_carousel(
                self.platform,
                caption.clone(),
                None,
                hash.clone(),
                Some(*scheduled_at),
            );
            match store.insert_carousel(&carousel, &group.paths) {
                Ok(()) => {}
                Err(e) if e.is_conflict() => {
                    metrics::counter!("planner_duplicates_skipped_total").increment(1);
                    continue;
                }
                Err(e) => return Err(e),
            }

            let post = match store.insert_post(NewPost {
                content_type: ContentType::Carousel,
                platform: self.platform,
                caption,
                hashtags: hashtags_for(&group.theme),
                media_urls: group.paths.clone(),
                thumbnail_url: group.paths.first().cloned(),
                scheduled_at: Some(*scheduled_at),
            }) {
                Ok(post) => post,
                Err(e) if e.is_conflict() => {
                    metrics::counter!("planner_duplicates_skipped_total").increment(1);
                    continue;
                }
                Err(e) => return Err(e),
            };

            store.record_carousel_usage(&hash, &group.theme, self.platform)?;
            metrics::counter!("planner_posts_created_total").increment(1);
            tracing::info!(
                post_id = %post.id,
                theme = %group.theme,
                items = group.paths.len(),
                scheduled_at = %scheduled_at,
                "planned carousel post"
            );
            created.push(post);
        }
        Ok(created)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Path heuristics
// ═══════════════════════════════════════════════════════════════════════════

/// Derive the project key for an asset path.
fn project_key(path: &str) -> String {
    let p = Path::new(path);
    let dirs: Vec<&str> = p
        .parent()
        .map(|parent| {
            parent
                .components()
                .filter_map(|c| match c {
                    std::path::Component::Normal(s) => s.to_str(),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    let meaningful: Vec<&str> = dirs
        .iter()
        .copied()
        .filter(|d| !GENERIC_DIRS.contains(&d.to_ascii_lowercase().as_str()))
        .collect();

    // Prefer the hyphen/underscore-bearing segment nearest the file
    if let Some(named) = meaningful
        .iter()
        .rev()
        .find(|d| d.contains('-') || d.contains('_'))
    {
        return named.to_ascii_lowercase();
    }
    // Else the nearest non-generic parent, else a catch-all bucket
    meaningful
        .last()
        .map(|d| d.to_ascii_lowercase())
        .unwrap_or_else(|| "unsorted".to_string())
}

/// Leading numeric token of a filename, if any.
fn leading_number(path: &str) -> Option<u64> {
    let name = Path::new(path).file_name()?.to_str()?;
    let digits: String = name.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

/// Ordering: leading numeric token numerically, lexicographic fallback.
fn numeric_then_lexicographic(a: &String, b: &String) -> std::cmp::Ordering {
    let name_a = Path::new(a).file_name().and_then(|n| n.to_str()).unwrap_or(a);
    let name_b = Path::new(b).file_name().and_then(|n| n.to_str()).unwrap_or(b);
    match (leading_number(a), leading_number(b)) {
        (Some(na), Some(nb)) => na.cmp(&nb).then_with(|| name_a.cmp(name_b)),
        _ => name_a.cmp(name_b),
    }
}

fn humanize(project: &str) -> String {
    project.replace(['-', '_'], " ").trim().to_string()
}

fn short_hash(project: &str) -> String {
    let digest = Sha256::digest(project.as_bytes());
    hex::encode(&digest[..8])
}

fn hashtags_for(theme: &str) -> Vec<String> {
    theme
        .split_whitespace()
        .filter(|w| w.len() > 2)
        .map(|w| format!("#{}", w.to_ascii_lowercase()))
        .collect()
}
