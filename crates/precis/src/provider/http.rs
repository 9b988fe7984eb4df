//! Shared HTTP plumbing: client construction, a single POST attempt, and
//! normalization of transport and status failures.

use std::time::{Duration, Instant};

use reqwest::header::HeaderMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use super::ProviderKind;
use crate::SummarizeError;

/// Longest vendor error body kept in an error message.
const MAX_ERROR_BODY_CHARS: usize = 500;

pub(crate) fn build_client(
    kind: ProviderKind,
    timeout: Duration,
) -> Result<reqwest::Client, SummarizeError> {
    reqwest::Client::builder()
        .user_agent(concat!("precis/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .map_err(|e| SummarizeError::configuration(kind, format!("failed to build HTTP client: {e}")))
}

/// Trim a trailing slash so `{base}/path` joins cleanly.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

/// POST `body` as JSON to `url` once and decode the 2xx body as `T`.
pub(crate) async fn post_json<B, T>(
    kind: ProviderKind,
    client: &reqwest::Client,
    url: &str,
    headers: HeaderMap,
    body: &B,
) -> Result<T, SummarizeError>
where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
{
    trace!(
        "{kind} request payload size: {} bytes",
        serde_json::to_string(body).map_or(0, |s| s.len())
    );
    let start = Instant::now();

    let resp = client
        .post(url)
        .headers(headers)
        .json(body)
        .send()
        .await
        .map_err(|e| SummarizeError::Transport {
            provider: kind,
            endpoint: url.to_string(),
            message: e.to_string(),
        })?;

    let status = resp.status();
    let text = resp.text().await.map_err(|e| SummarizeError::Transport {
        provider: kind,
        endpoint: url.to_string(),
        message: format!("failed to read response: {e}"),
    })?;

    debug!(
        "{kind} response: HTTP {} in {:.1}s ({} bytes)",
        status,
        start.elapsed().as_secs_f64(),
        text.len()
    );

    if !status.is_success() {
        return Err(SummarizeError::provider(
            kind,
            status.as_u16(),
            vendor_message(&text),
        ));
    }

    serde_json::from_str(&text)
        .map_err(|e| SummarizeError::malformed(kind, format!("failed to parse response: {e}")))
}

/// Pull the human-readable message out of a vendor error body.
///
/// Handles `{"error": {"message": ...}}`, `{"error": "..."}` and
/// `{"message": ...}`; falls back to the (truncated) raw body.
pub(crate) fn vendor_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let from_json = parsed.as_ref().and_then(|v| {
        v.pointer("/error/message")
            .or_else(|| v.get("error").filter(|e| e.is_string()))
            .or_else(|| v.get("message"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
    });

    match from_json {
        Some(msg) => msg,
        None if body.trim().is_empty() => "(empty response body)".to_string(),
        None => body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect(),
    }
}
