//! Cadence pipeline daemon and one-shot commands.
//!
//! Without a subcommand the binary runs the scheduled job daemon: the
//! approval digest, due-publish, and metrics-harvest sweeps on their
//! intervals until SIGINT.
//!
//! # Usage
//!
//! ```bash
//! # Run the daemon with default settings
//! cadence-pipeline
//!
//! # Plan carousels from a media export
//! cadence-pipeline plan ./exports/spring-drop --platform instagram
//!
//! # Push pending drafts to the publisher API
//! cadence-pipeline drafts
//!
//! # Run one sweep by hand
//! cadence-pipeline sweep digest
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use cadence_core::metrics::{init_metrics, start_metrics_server};
use cadence_core::{Platform, PostStatus};
use cadence_pipeline::{
    BufferClient, BufferConfig, CarouselPlanner, JobConfig, JobRunner, Planner, Publisher, Store,
};

/// Cadence content pipeline.
#[derive(Parser, Debug)]
#[command(name = "cadence-pipeline")]
#[command(about = "Content scheduling and publishing pipeline")]
#[command(version)]
struct Args {
    /// SQLite database path
    #[arg(long, env = "CADENCE_DB", default_value = "./data/cadence.db")]
    db_path: PathBuf,

    /// Publisher API base URL
    #[arg(long, env = "BUFFER_API_URL", default_value = "https://api.bufferapp.com/1")]
    buffer_url: String,

    /// Publisher API access token
    #[arg(long, env = "BUFFER_ACCESS_TOKEN", hide_env_values = true, default_value = "")]
    buffer_token: String,

    /// Public base URL for approval links
    #[arg(long, env = "CADENCE_BASE_URL", default_value = "http://localhost:3000")]
    base_url: String,

    /// Shared secret for signing approval links
    #[arg(long, env = "CADENCE_WEBHOOK_SECRET", hide_env_values = true, default_value = "")]
    webhook_secret: String,

    /// Digest sweep interval in seconds
    #[arg(long, default_value = "21600")]
    digest_interval: u64,

    /// Due-publish sweep interval in seconds
    #[arg(long, default_value = "60")]
    publish_interval: u64,

    /// Metrics harvest interval in seconds
    #[arg(long, default_value = "3600")]
    harvest_interval: u64,

    /// Metrics HTTP server port (0 to disable)
    #[arg(long, default_value = "9091")]
    metrics_port: u16,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Group a media directory into carousels and schedule them
    Plan {
        /// Directory of media assets to plan
        media_dir: PathBuf,

        /// Target platform
        #[arg(long, default_value = "instagram")]
        platform: Platform,

        /// Planning horizon in days
        #[arg(long, default_value = "14")]
        days: i64,
    },

    /// Create remote drafts for local draft posts
    Drafts {
        /// Maximum posts to push
        #[arg(long, default_value = "50")]
        limit: u32,
    },

    /// Run one sweep immediately
    Sweep {
        /// Which sweep to run: digest, publish, or harvest
        job: String,
    },

    /// Pull engagement stats for published posts
    Harvest,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("info".parse()?)
                .add_directive("cadence_pipeline=debug".parse()?),
        )
        .init();

    let args = Args::parse();

    if let Some(parent) = args.db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let store = Arc::new(Store::open(&args.db_path)?);

    // Planning is local-only and must work without API credentials
    if let Some(Command::Plan {
        media_dir,
        platform,
        days,
    }) = &args.command
    {
        return plan(&store, media_dir, *platform, *days);
    }

    if args.command.is_none() && args.webhook_secret.is_empty() {
        anyhow::bail!("CADENCE_WEBHOOK_SECRET is required to sign approval links");
    }

    let client = BufferClient::new(BufferConfig::new(&args.buffer_url, &args.buffer_token))?;
    let publisher = Arc::new(Publisher::new(Arc::clone(&store), Arc::new(client)));

    let job_config = JobConfig {
        digest_interval: Duration::from_secs(args.digest_interval),
        publish_interval: Duration::from_secs(args.publish_interval),
        harvest_interval: Duration::from_secs(args.harvest_interval),
        approval_base_url: args.base_url.clone(),
        approval_secret: args.webhook_secret.clone(),
    };
    let runner = JobRunner::new(Arc::clone(&store), Arc::clone(&publisher), job_config);

    match args.command {
        None => run_daemon(runner, args.metrics_port).await,
        Some(Command::Plan { .. }) => unreachable!("handled above"),
        Some(Command::Drafts { limit }) => {
            let drafts = store.list_by_status(PostStatus::Draft, limit)?;
            let outcomes = publisher.create_drafts(&drafts).await?;
            let failed = outcomes.iter().filter(|o| o.outcome.is_err()).count();
            tracing::info!(
                pushed = outcomes.len() - failed,
                failed,
                "draft push complete"
            );
            Ok(())
        }
        Some(Command::Sweep { job }) => {
            let n = match job.as_str() {
                "digest" => runner.digest_sweep().await?,
                "publish" => runner.publish_sweep().await?,
                "harvest" => runner.harvest_sweep().await?,
                other => anyhow::bail!("unknown sweep: {other}"),
            };
            tracing::info!(job = %job, items = n, "sweep complete");
            Ok(())
        }
        Some(Command::Harvest) => {
            let n = publisher.harvest_metrics().await?;
            tracing::info!(snapshots = n, "harvest complete");
            Ok(())
        }
    }
}

async fn run_daemon(runner: JobRunner, metrics_port: u16) -> Result<()> {
    if metrics_port > 0 {
        let handle = init_metrics();
        start_metrics_server(metrics_port, handle).await?;
        tracing::info!("Metrics server listening on port {}", metrics_port);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received, stopping gracefully...");
            let _ = shutdown_tx.send(true);
        }
    });

    runner.run(shutdown_rx).await?;
    tracing::info!("Daemon stopped");
    Ok(())
}

/// Plan carousels from a media directory.
fn plan(store: &Store, media_dir: &Path, platform: Platform, days: i64) -> Result<()> {
    let mut paths = Vec::new();
    collect_media(media_dir, &mut paths)
        .with_context(|| format!("Failed to walk {}", media_dir.display()))?;
    tracing::info!(assets = paths.len(), dir = %media_dir.display(), "collected media");

    let carousel_planner = CarouselPlanner::new(platform);
    let grouping = carousel_planner.group_assets(&paths);
    tracing::info!(
        groups = grouping.groups.len(),
        ungrouped = grouping.ungrouped.len(),
        "grouped assets"
    );

    let now = Utc::now();
    let times = Planner::default().distribute(
        platform,
        grouping.groups.len(),
        now,
        now,
        now + ChronoDuration::days(days),
    )?;
    let created = carousel_planner.create_carousel_posts(store, &grouping.groups, &times)?;

    for post in &created {
        tracing::info!(
            post_id = %post.id,
            scheduled_at = ?post.scheduled_at,
            items = post.media_urls.len(),
            "planned"
        );
    }
    tracing::info!(created = created.len(), "planning complete");
    Ok(())
}

/// Recursively collect image paths under a directory, sorted for
/// deterministic planner input.
fn collect_media(dir: &Path, out: &mut Vec<String>) -> std::io::Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.path());
    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            collect_media(&path, out)?;
        } else if is_image(&path) {
            out.push(path.to_string_lossy().into_owned());
        }
    }
    Ok(())
}

fn is_image(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
        Some("jpg" | "jpeg" | "png" | "webp")
    )
}
