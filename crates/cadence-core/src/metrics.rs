//! Prometheus metrics helpers for the Cadence pipeline.
//!
//! This module provides centralized metrics initialization and common metric
//! definitions used across Cadence components.
//!
//! # Usage
//!
//! ```rust,ignore
//! use cadence_core::metrics::{init_metrics, start_metrics_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let handle = init_metrics();
//!     start_metrics_server(9091, handle).await.unwrap();
//!
//!     use metrics::counter;
//!     counter!("drafts_created_total").increment(1);
//! }
//! ```
//!
//! # Metric Naming Conventions
//!
//! - Prefix: Component name (e.g., `planner_`, `webhook_`, `api_`)
//! - Suffix: Unit or type (e.g., `_total`, `_seconds`)
//! - Labels: Use sparingly to avoid cardinality explosion

use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Initialize the Prometheus metrics recorder.
///
/// This must be called once at startup before any metrics are recorded.
/// Returns a handle that can be used with [`start_metrics_server`].
///
/// # Panics
///
/// Panics if called more than once (the recorder can only be installed once).
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    register_common_metrics();

    handle
}

/// Try to initialize the Prometheus metrics recorder.
///
/// Like [`init_metrics`] but returns `None` if the recorder is already
/// installed, instead of panicking. Useful for tests or optional metrics.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    PrometheusBuilder::new().install_recorder().ok()
}

/// Start the Prometheus metrics HTTP server.
///
/// Serves the `/metrics` endpoint on the specified port. This spawns a
/// background task and returns immediately.
pub async fn start_metrics_server(
    port: u16,
    handle: PrometheusHandle,
) -> Result<(), std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        axum::serve(listener, app).await.unwrap();
    });

    Ok(())
}

/// Register descriptions for common metrics used across Cadence.
///
/// Called automatically by [`init_metrics`].
fn register_common_metrics() {
    // =========================================================================
    // Planner Metrics
    // =========================================================================

    describe_counter!(
        "planner_posts_created_total",
        "Posts created by the carousel planning job"
    );
    describe_counter!(
        "planner_duplicates_skipped_total",
        "Planner inserts skipped because the content hash already existed"
    );
    describe_counter!(
        "planner_ungrouped_assets_total",
        "Assets routed to single-post candidates instead of carousels"
    );

    // =========================================================================
    // Publisher Metrics
    // =========================================================================

    describe_counter!("drafts_created_total", "External drafts created");
    describe_counter!(
        "drafts_failed_total",
        "Posts whose draft creation failed after retries"
    );
    describe_counter!("posts_published_total", "Posts marked published");
    describe_counter!("posts_rejected_total", "Posts rejected and cleaned up");
    describe_counter!(
        "publish_reverts_total",
        "Approved posts reverted to draft after a failed publish"
    );
    describe_counter!(
        "metrics_snapshots_total",
        "Per-post metrics snapshots harvested"
    );

    // =========================================================================
    // Publisher API Client Metrics
    // =========================================================================

    describe_counter!("api_requests_total", "Publisher API requests issued");
    describe_counter!("api_retries_total", "Publisher API retry attempts");
    describe_counter!(
        "api_rate_limited_total",
        "Publisher API responses with status 429"
    );
    describe_histogram!(
        "api_request_duration_seconds",
        "Publisher API request latency"
    );

    // =========================================================================
    // Webhook Metrics
    // =========================================================================

    describe_counter!(
        "webhook_requests_total",
        "Approval webhook requests received (label: action)"
    );
    describe_counter!(
        "webhook_rejected_total",
        "Webhook requests refused (label: reason)"
    );
    describe_gauge!(
        "webhook_cooldown_entries",
        "Entries currently held in the per-post cooldown cache"
    );

    // =========================================================================
    // Job Runner Metrics
    // =========================================================================

    describe_counter!("job_runs_total", "Scheduled job executions (label: job)");
    describe_gauge!(
        "drafts_pending",
        "Draft posts awaiting approval as of the last digest sweep"
    );
    describe_counter!(
        "job_failures_total",
        "Scheduled job executions that errored (label: job)"
    );
}

/// Increment a counter with no labels.
///
/// Convenience wrapper around `metrics::counter!`.
#[inline]
pub fn increment(name: &'static str, count: u64) {
    metrics::counter!(name).increment(count);
}

/// Set a gauge value.
///
/// Convenience wrapper around `metrics::gauge!`.
#[inline]
pub fn set_gauge(name: &'static str, value: f64) {
    metrics::gauge!(name).set(value);
}
