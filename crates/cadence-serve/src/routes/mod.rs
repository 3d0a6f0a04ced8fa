//! API route definitions.

mod health;
mod webhooks;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the complete API router.
///
/// # Route Structure
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Signed (HMAC link signature instead of auth middleware)
/// - `POST /webhooks/approve` - Approve a draft and publish it
/// - `POST /webhooks/reject` - Reject a draft and delete remote drafts
pub fn router(state: AppState) -> Router {
    let public = Router::new().route("/health", get(health::health_check));

    // Approval links carry their own authentication: every request is
    // verified against the HMAC signature in its query string
    let webhooks = Router::new()
        .route("/approve", post(webhooks::approve))
        .route("/reject", post(webhooks::reject_post));

    Router::new()
        .merge(public)
        .nest("/webhooks", webhooks)
        .with_state(state)
}
