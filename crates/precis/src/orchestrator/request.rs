//! Request lifecycle records.
//!
//! A [`PendingRequest`] moves `pending → processing → completed | error`.
//! The terminal payload lives inside [`RequestState`], so a record carries a
//! result only when completed and an error only when failed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::SummaryResult;

/// Generate a unique request id.
pub fn generate_request_id() -> String {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    // Counter separates ids minted within the same clock tick.
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("rq-{ts:x}-{count:04x}")
}

/// Lifecycle state, tagged by `status` on the wire.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RequestState {
    Pending,
    Processing,
    Completed { result: SummaryResult },
    Error { error: String },
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Completed { .. } | RequestState::Error { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            RequestState::Pending => "pending",
            RequestState::Processing => "processing",
            RequestState::Completed { .. } => "completed",
            RequestState::Error { .. } => "error",
        }
    }
}

/// Bookkeeping for one submitted request. Owned by the orchestrator;
/// callers receive clones.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingRequest {
    pub id: String,
    /// Empty when the request carried no content key.
    pub content_key: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub state: RequestState,
}

impl PendingRequest {
    pub fn new(id: impl Into<String>, content_key: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            content_key: content_key.into(),
            created_at: now,
            state: RequestState::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn result(&self) -> Option<&SummaryResult> {
        match &self.state {
            RequestState::Completed { result } => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            RequestState::Error { error } => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::ProviderKind;

    #[test]
    fn request_ids_are_unique() {
        let a = generate_request_id();
        let b = generate_request_id();
        assert_ne!(a, b);
        assert!(a.starts_with("rq-"));
    }

    #[test]
    fn serializes_flat_with_status_tag() {
        let now = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let mut req = PendingRequest::new("rq-1", "https://example.com", now);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["contentKey"], "https://example.com");
        assert!(json.get("result").is_none());
        assert!(json.get("error").is_none());

        req.state = RequestState::Completed {
            result: SummaryResult {
                summary: "X".into(),
                provider: ProviderKind::OpenAi,
                model: None,
                cached: false,
            },
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["result"]["summary"], "X");
        assert!(json.get("error").is_none());

        req.state = RequestState::Error {
            error: "boom".into(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            json!({
                "id": "rq-1",
                "contentKey": "https://example.com",
                "createdAt": "2025-01-02T03:04:05Z",
                "status": "error",
                "error": "boom",
            })
        );
    }

    #[test]
    fn accessors_follow_state() {
        let mut req = PendingRequest::new("rq-2", "", Utc::now());
        assert!(!req.is_terminal());
        assert!(req.result().is_none() && req.error().is_none());
        req.state = RequestState::Error {
            error: "x".into(),
        };
        assert!(req.is_terminal());
        assert_eq!(req.error(), Some("x"));
        assert!(req.result().is_none());
    }
}
