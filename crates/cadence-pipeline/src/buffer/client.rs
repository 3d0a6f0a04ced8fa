//! reqwest implementation of the publisher API client.
//!
//! Every response is classified before the retry combinator sees it:
//! 4xx (except 429) aborts immediately, 429 carries the server's
//! `Retry-After` hint, 5xx and transport failures are transient, and a
//! 2xx body missing expected fields is terminal since retrying cannot
//! fix a schema mismatch. The access credential never appears in logs or
//! error strings.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

use cadence_core::retry::{retry_with_policy, RetryPolicy};
use cadence_core::{Error, Platform, Result, API_TIMEOUT_SECS};

use super::{validate_draft, Profile, PublisherApi};

/// Configuration for the publisher API client.
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// API base URL, e.g. "https://api.bufferapp.com/1".
    pub base_url: String,
    /// Bearer access token. Redacted from all output.
    pub access_token: String,
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl BufferConfig {
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            access_token: access_token.into(),
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(API_TIMEOUT_SECS),
        }
    }
}

/// reqwest-backed publisher API client.
pub struct BufferClient {
    config: BufferConfig,
    http: reqwest::Client,
}

impl BufferClient {
    /// Build a client. Fails fast when the access token is missing so the
    /// error surfaces at startup rather than inside a retry loop.
    pub fn new(config: BufferConfig) -> Result<Self> {
        if config.access_token.trim().is_empty() {
            return Err(Error::Validation(
                "publisher API access token is not configured".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;
        Ok(Self { config, http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Strip the access token out of text destined for logs or errors.
    fn redact(&self, text: &str) -> String {
        text.replace(&self.config.access_token, "[redacted]")
    }

    /// Issue one request and classify the outcome.
    async fn request(&self, method: reqwest::Method, path: &str, body: Option<&serde_json::Value>) -> Result<serde_json::Value> {
        let started = std::time::Instant::now();
        metrics::counter!("api_requests_total").increment(1);

        let mut req = self
            .http
            .request(method, self.url(path))
            .bearer_auth(&self.config.access_token);
        if let Some(body) = body {
            req = req.json(body);
        }

        let response = req
            .send()
            .await
            .map_err(|e| Error::Network(self.redact(&e.to_string())))?;
        metrics::histogram!("api_request_duration_seconds").record(started.elapsed().as_secs_f64());

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let text = response
            .text()
            .await
            .map_err(|e| Error::Network(self.redact(&e.to_string())))?;

        if status.as_u16() == 429 {
            metrics::counter!("api_rate_limited_total").increment(1);
            return Err(Error::RateLimited { retry_after });
        }
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: self.redact(&text),
            });
        }

        serde_json::from_str(&text)
            .map_err(|e| Error::MalformedResponse(format!("invalid JSON body: {e}")))
    }

    /// Run `path` under the retry policy.
    async fn request_with_retry(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<serde_json::Value>,
        op: &str,
    ) -> Result<serde_json::Value> {
        retry_with_policy(&self.config.retry, op, || {
            self.request(method.clone(), path, body.as_ref())
        })
        .await
    }
}

#[async_trait]
impl PublisherApi for BufferClient {
    async fn list_profiles(&self) -> Result<Vec<Profile>> {
        let body = self
            .request_with_retry(reqwest::Method::GET, "profiles.json", None, "list_profiles")
            .await?;
        let profiles = body
            .as_array()
            .ok_or_else(|| Error::MalformedResponse("profiles is not an array".to_string()))?;
        profiles
            .iter()
            .map(|p| {
                serde_json::from_value(p.clone())
                    .map_err(|e| Error::MalformedResponse(format!("bad profile entry: {e}")))
            })
            .collect()
    }

    async fn create_draft(
        &self,
        platform: Platform,
        profile_ids: &[String],
        text: &str,
        media: &[String],
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<BTreeMap<String, String>> {
        validate_draft(platform, profile_ids, text, media)?;

        // The create endpoint reports a single update per call, so one
        // request per profile yields the profile → draft mapping.
        let mut drafts = BTreeMap::new();
        for profile_id in profile_ids {
            let mut payload = json!({
                "profile_ids": [profile_id],
                "text": text,
                "media": { "photo": media[0], "extra_media": media[1..] },
                "draft": true,
            });
            if let Some(at) = scheduled_at {
                payload["scheduled_at"] = json!(at.timestamp());
            }

            let body = self
                .request_with_retry(
                    reqwest::Method::POST,
                    "updates/create.json",
                    Some(payload),
                    "create_draft",
                )
                .await?;
            let draft_id = body
                .pointer("/update/id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    Error::MalformedResponse("create response missing update.id".to_string())
                })?;
            drafts.insert(profile_id.clone(), draft_id.to_string());
        }
        Ok(drafts)
    }

    async fn publish(&self, draft_id: &str) -> Result<()> {
        let body = self
            .request_with_retry(
                reqwest::Method::POST,
                &format!("updates/{draft_id}/share.json"),
                None,
                "publish",
            )
            .await?;
        expect_success(&body, "share")
    }

    async fn delete(&self, draft_id: &str) -> Result<()> {
        let body = self
            .request_with_retry(
                reqwest::Method::POST,
                &format!("updates/{draft_id}/destroy.json"),
                None,
                "delete",
            )
            .await?;
        expect_success(&body, "destroy")
    }

    async fn get_post(&self, draft_id: &str) -> Result<serde_json::Value> {
        let body = self
            .request_with_retry(
                reqwest::Method::GET,
                &format!("updates/{draft_id}.json"),
                None,
                "get_post",
            )
            .await?;
        // Stats live under "statistics" when present; return the whole
        // update so harvesting keeps fields we did not anticipate.
        let update = body.get("update").cloned();
        Ok(update.unwrap_or(body))
    }
}

/// A 2xx body still signals failure when `success` is explicitly false.
fn expect_success(body: &serde_json::Value, op: &str) -> Result<()> {
    match body.get("success").and_then(|v| v.as_bool()) {
        Some(true) | None => Ok(()),
        Some(false) => Err(Error::MalformedResponse(format!(
            "{op} reported success=false"
        ))),
    }
}

/// Parse a `Retry-After` header into a delay hint (seconds form only;
/// the HTTP-date form is rare enough to fall back to computed backoff).
fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
