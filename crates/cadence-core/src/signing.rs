//! HMAC signing for approval links.
//!
//! Links embed `postId`, a unix timestamp, and a hex HMAC-SHA256 over
//! `"{timestamp}|{postId}|{action}"`. Verification is constant-time via
//! the `hmac` crate. The timestamp window is checked before the
//! signature so an expired link is reported as expired regardless of
//! whether its signature would have verified.

use std::time::Duration;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::ApprovalAction;

type HmacSha256 = Hmac<Sha256>;

/// Default acceptance window around "now" for link timestamps.
pub const DEFAULT_TIMESTAMP_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Why a signed request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureRejection {
    /// Timestamp outside the acceptance window (replay mitigation).
    Expired,
    /// HMAC comparison failed.
    InvalidSignature,
}

/// Compute the hex signature for an approval link.
pub fn sign(secret: &[u8], timestamp: i64, post_id: &str, action: ApprovalAction) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(payload(timestamp, post_id, action).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a signed approval request.
///
/// The timestamp window check short-circuits before any cryptographic
/// comparison, so callers can distinguish a stale link from a forged one.
pub fn verify(
    secret: &[u8],
    timestamp: i64,
    post_id: &str,
    action: ApprovalAction,
    signature_hex: &str,
    now: i64,
    window: Duration,
) -> Result<(), SignatureRejection> {
    let skew = (now - timestamp).unsigned_abs();
    if skew > window.as_secs() {
        return Err(SignatureRejection::Expired);
    }

    let expected = hex::decode(signature_hex).map_err(|_| SignatureRejection::InvalidSignature)?;
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(payload(timestamp, post_id, action).as_bytes());
    mac.verify_slice(&expected)
        .map_err(|_| SignatureRejection::InvalidSignature)
}

fn payload(timestamp: i64, post_id: &str, action: ApprovalAction) -> String {
    format!("{}|{}|{}", timestamp, post_id, action.as_str())
}

/// Build the approve/reject link for a post, for use in digests.
pub fn approval_link(
    base_url: &str,
    secret: &[u8],
    timestamp: i64,
    post_id: &str,
    action: ApprovalAction,
) -> String {
    let sig = sign(secret, timestamp, post_id, action);
    format!(
        "{}/webhooks/{}?postId={}&ts={}&sig={}",
        base_url.trim_end_matches('/'),
        action.as_str(),
        post_id,
        timestamp,
        sig
    )
}
