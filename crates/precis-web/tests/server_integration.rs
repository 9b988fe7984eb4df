//! Integration tests for the precis-web server.
//!
//! These tests start a real axum server on a random port, backed by an
//! in-memory cache and a mock OpenAI-compatible vendor, and exercise the RPC
//! endpoint over HTTP.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Json;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use precis::cache::{MemoryKvStore, SummaryCache};
use precis::orchestrator::{Orchestrator, OrchestratorConfig};
use precis::provider::ProviderRegistry;
use precis_web::{MemoryPageSource, Target, WebConfig, spawn_web};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// A mock `/chat/completions` endpoint. Answers 429 for the key
/// `sk-limited`, a fixed summary otherwise.
async fn spawn_mock_vendor() -> (String, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let router = axum::Router::new().route(
        "/chat/completions",
        post(move |headers: HeaderMap, Json(_body): Json<Value>| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default();
                if auth == "Bearer sk-limited" {
                    return (
                        StatusCode::TOO_MANY_REQUESTS,
                        Json(json!({"error": {"message": "Rate limit reached for requests"}})),
                    );
                }
                (
                    StatusCode::OK,
                    Json(json!({
                        "model": "gpt-mock",
                        "choices": [{"message": {"role": "assistant", "content": "Mock summary"}}]
                    })),
                )
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    (format!("http://{addr}"), calls)
}

struct TestServer {
    base: String,
    vendor: String,
    vendor_calls: Arc<AtomicUsize>,
    client: reqwest::Client,
    _shutdown: tokio_util::sync::DropGuard,
}

impl TestServer {
    async fn rpc(&self, body: Value) -> (StatusCode, Value) {
        let resp = self
            .client
            .post(format!("{}/api/rpc", self.base))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = StatusCode::from_u16(resp.status().as_u16()).unwrap();
        (status, resp.json().await.unwrap())
    }

    fn summary_request(&self, key: &str, content: &str) -> Value {
        json!({
            "messages": [{"role": "user", "content": content}],
            "provider": "openai",
            "apiKey": key,
            "endpoint": self.vendor,
            "contentKey": "https://example.com"
        })
    }

    async fn wait_terminal(&self, request_id: &str) -> Value {
        for _ in 0..400 {
            let (status, record) = self
                .rpc(json!({"action": "status", "requestId": request_id}))
                .await;
            assert_eq!(status, StatusCode::OK);
            if record["status"] == "completed" || record["status"] == "error" {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("request {request_id} did not finish");
    }
}

/// Helper: spawn a test server on port 0 (random available port).
async fn spawn_test_server() -> TestServer {
    let (vendor, vendor_calls) = spawn_mock_vendor().await;

    let orchestrator = Orchestrator::new(
        OrchestratorConfig::default(),
        SummaryCache::new(Arc::new(MemoryKvStore::new())),
        ProviderRegistry::with_defaults(),
    );
    let pages = MemoryPageSource::new().with_page(
        Target {
            id: "tab-1".into(),
            url: "https://example.com".into(),
            title: "Example Domain".into(),
        },
        "Example Domain. This domain is for use in illustrative examples.",
    );

    let config = WebConfig {
        bind_addr: ([127, 0, 0, 1], 0).into(),
    };
    let shutdown = CancellationToken::new();
    let (addr, _server) = spawn_web(orchestrator, Arc::new(pages), config, shutdown.clone())
        .await
        .unwrap();

    TestServer {
        base: format!("http://{addr}"),
        vendor,
        vendor_calls,
        client: reqwest::Client::new(),
        _shutdown: shutdown.drop_guard(),
    }
}

// ── Plumbing ─────────────────────────────────────────────────────────

#[tokio::test]
async fn health_responds_ok() {
    let server = spawn_test_server().await;
    let resp = reqwest::get(format!("{}/api/health", server.base))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn unknown_action_is_bad_request() {
    let server = spawn_test_server().await;
    let (status, body) = server.rpc(json!({"action": "reboot"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("invalid request"));

    let resp = server
        .client
        .post(format!("{}/api/rpc", server.base))
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

// ── Pages ────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_targets_and_extract_text() {
    let server = spawn_test_server().await;

    let (status, body) = server.rpc(json!({"action": "listTargets"})).await;
    assert_eq!(status, StatusCode::OK);
    let targets = body["targets"].as_array().unwrap();
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0]["id"], "tab-1");
    assert_eq!(targets[0]["title"], "Example Domain");

    let (status, body) = server
        .rpc(json!({"action": "extractText", "targetId": "tab-1"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["text"].as_str().unwrap().starts_with("Example Domain."));

    let (status, body) = server
        .rpc(json!({"action": "extractText", "targetId": "tab-9"}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("tab-9"));
}

// ── Summaries ────────────────────────────────────────────────────────

#[tokio::test]
async fn submit_summary_completes_and_is_cached() {
    let server = spawn_test_server().await;

    let request = server.summary_request("sk-test", "Example Domain text");
    let (status, body) = server
        .rpc(json!({"action": "submitSummary", "data": request}))
        .await;
    assert_eq!(status, StatusCode::OK);
    let id = body["requestId"].as_str().unwrap().to_string();

    let record = server.wait_terminal(&id).await;
    assert_eq!(record["status"], "completed");
    assert_eq!(record["id"], id);
    assert_eq!(record["contentKey"], "https://example.com");
    assert_eq!(record["result"]["summary"], "Mock summary");
    assert_eq!(record["result"]["model"], "gpt-mock");
    assert_eq!(record["result"]["cached"], false);
    assert_eq!(server.vendor_calls.load(Ordering::SeqCst), 1);

    // Same content key again: answered from the cache, vendor untouched.
    let (_, body) = server
        .rpc(json!({"action": "submitSummary", "data": request, "requestId": "again"}))
        .await;
    assert_eq!(body["requestId"], "again");
    let record = server.wait_terminal("again").await;
    assert_eq!(record["result"]["cached"], true);
    assert_eq!(record["result"]["summary"], "Mock summary");
    assert_eq!(server.vendor_calls.load(Ordering::SeqCst), 1);

    let (_, stats) = server.rpc(json!({"action": "cacheStats"})).await;
    assert_eq!(stats["count"], 1);
    assert!(stats["size"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn status_of_unknown_request_is_not_found() {
    let server = spawn_test_server().await;
    let (status, body) = server
        .rpc(json!({"action": "status", "requestId": "rq-missing"}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("rq-missing"));
}

#[tokio::test]
async fn submit_chat_surfaces_rate_limit_hint() {
    let server = spawn_test_server().await;
    let request = server.summary_request("sk-limited", "anything");

    let (status, body) = server
        .rpc(json!({"action": "submitChat", "data": request}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("summary").is_none());
    assert_eq!(body["provider"], "openai");
    let error = body["error"].as_str().unwrap();
    assert!(error.contains("HTTP 429"), "{error}");
    assert!(error.contains("rate limit"), "{error}");
    assert!(!error.contains("sk-limited"), "{error}");

    let (_, stats) = server.rpc(json!({"action": "cacheStats"})).await;
    assert_eq!(stats["count"], 0);
}

#[tokio::test]
async fn submit_chat_returns_summary_inline() {
    let server = spawn_test_server().await;
    let request = server.summary_request("sk-test", "inline text");

    let (status, body) = server
        .rpc(json!({"action": "submitChat", "data": request}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"], "Mock summary");
    assert_eq!(body["cached"], false);
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn clear_cache_empties_it() {
    let server = spawn_test_server().await;
    let request = server.summary_request("sk-test", "to be cleared");
    server
        .rpc(json!({"action": "submitChat", "data": request}))
        .await;

    let (_, stats) = server.rpc(json!({"action": "cacheStats"})).await;
    assert_eq!(stats["count"], 1);

    let (status, body) = server.rpc(json!({"action": "clearCache"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let (_, stats) = server.rpc(json!({"action": "cacheStats"})).await;
    assert_eq!(stats["count"], 0);
}

// ── Conversation context ─────────────────────────────────────────────

#[tokio::test]
async fn context_is_recorded_and_cleared() {
    let server = spawn_test_server().await;

    let (_, body) = server
        .rpc(json!({"action": "getContext", "targetId": "tab-1"}))
        .await;
    assert!(body["messages"].is_null());

    let mut request = server.summary_request("sk-test", "What is on this page?");
    request["contextId"] = json!("tab-1");
    let (_, body) = server
        .rpc(json!({"action": "submitChat", "data": request}))
        .await;
    assert_eq!(body["summary"], "Mock summary");

    let (_, body) = server
        .rpc(json!({"action": "getContext", "targetId": "tab-1"}))
        .await;
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.last().unwrap()["role"], "assistant");
    assert_eq!(messages.last().unwrap()["content"], "Mock summary");

    let (status, body) = server
        .rpc(json!({"action": "clearContext", "targetId": "tab-1"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let (_, body) = server
        .rpc(json!({"action": "getContext", "targetId": "tab-1"}))
        .await;
    assert!(body["messages"].is_null());
}
