//! Cadence Serve - HTTP approval surface for the content pipeline.
//!
//! This crate exposes the webhook endpoints that approval digests link
//! to. There is no session or token auth layer: each link carries an
//! HMAC signature over its own parameters, so possession of a fresh
//! digest is the credential.
//!
//! # Architecture
//!
//! - **AppState**: Shared state (store, publisher orchestrator, cooldown cache)
//! - **Cooldown**: Bounded per-post cache absorbing double clicks
//! - **Routes**: Health check plus the approve/reject webhook handlers

mod cooldown;
mod error;
mod routes;
mod state;

pub use self::cooldown::Cooldown;
pub use self::error::ApiError;
pub use self::routes::router;
pub use self::state::{AppState, Config};
