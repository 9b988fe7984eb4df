//! Request orchestration: the lifecycle of every summarization and chat
//! request.
//!
//! [`Orchestrator::submit`] registers a [`PendingRequest`] and returns its id
//! at once; a spawned task drives the request through cache lookup, prompt
//! resolution, the direct-or-chunked provider call, and the cache write.
//! Callers poll [`Orchestrator::status`]. [`Orchestrator::chat`] is the
//! synchronous variant and always yields an [`LlmResponse`].
//!
//! Failures never escape a request's task: provider errors and panics alike
//! end in the `error` state. Cache failures are logged and otherwise
//! ignored.
//!
//! The orchestrator is a cheap handle over shared state. The process entry
//! point constructs one and hands clones to whatever needs it.

pub mod config;
pub mod request;

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::cache::{CacheStats, SummaryCache};
use crate::clock::{Clock, SystemClock};
use crate::context::ContextChunker;
use crate::provider::{ProviderConfig, ProviderRegistry};
use crate::{
    ChatRequest, LlmResponse, Message, StoreError, SummarizeError, SummaryResult, prompt,
};

pub use config::OrchestratorConfig;
pub use request::{PendingRequest, RequestState, generate_request_id};

/// Handle to the request orchestrator. Clones share all state.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    config: OrchestratorConfig,
    cache: SummaryCache,
    registry: ProviderRegistry,
    chunker: ContextChunker,
    clock: Arc<dyn Clock>,
    requests: Mutex<HashMap<String, PendingRequest>>,
    /// Conversation history by originating context id. Last write wins.
    contexts: Mutex<HashMap<String, Vec<Message>>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.inner.config)
            .field("registry", &self.inner.registry)
            .field("requests", &self.requests().len())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, cache: SummaryCache, registry: ProviderRegistry) -> Self {
        Self::new_with_clock(config, cache, registry, Arc::new(SystemClock))
    }

    /// Like [`new`](Self::new), with the clock used for request timestamps
    /// and retention.
    pub fn new_with_clock(
        config: OrchestratorConfig,
        cache: SummaryCache,
        registry: ProviderRegistry,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let chunker = ContextChunker::new(config.chunk_budget);
        Self {
            inner: Arc::new(Inner {
                config,
                cache,
                registry,
                chunker,
                clock,
                requests: Mutex::new(HashMap::new()),
                contexts: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> &SummaryCache {
        &self.inner.cache
    }

    /// Register `request` and start processing it in the background.
    ///
    /// Returns the request id before any provider call is made. A cacheable
    /// request with a fresh cache entry is registered already completed.
    /// Without `request_id` a fresh id is generated; reusing an id that is
    /// still tracked replaces its record, so callers supplying ids must keep
    /// them unique.
    #[instrument(skip_all, fields(provider = %request.provider))]
    pub async fn submit(&self, request: ChatRequest, request_id: Option<String>) -> String {
        let id = request_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(generate_request_id);
        let content_key = request.content_key().unwrap_or_default().to_string();
        let mut record = PendingRequest::new(id.clone(), content_key, self.inner.clock.now());

        if let Some(result) = self.cached_result(&request).await {
            info!("request {id} served from cache");
            self.remember_context(&request, &result.summary);
            record.state = RequestState::Completed { result };
            self.requests().insert(id.clone(), record);
            return id;
        }

        self.requests().insert(id.clone(), record);
        debug!("request {id} registered");

        let this = self.clone();
        let task_id = id.clone();
        tokio::spawn(async move {
            this.process(task_id, request).await;
        });
        id
    }

    /// Current record for `id`, if still tracked.
    pub fn status(&self, id: &str) -> Option<PendingRequest> {
        self.requests().get(id).cloned()
    }

    /// Number of tracked request records.
    pub fn request_count(&self) -> usize {
        self.requests().len()
    }

    /// Drive one request to its terminal state.
    #[instrument(skip_all, fields(request_id = %id))]
    async fn process(&self, id: String, request: ChatRequest) {
        self.transition(&id, RequestState::Processing);

        let outcome = AssertUnwindSafe(self.execute(&request)).catch_unwind().await;
        let state = match outcome {
            Ok(Ok(result)) => {
                info!(
                    "request {id} completed ({} chars{})",
                    result.summary.len(),
                    if result.cached { ", cached" } else { "" }
                );
                RequestState::Completed { result }
            }
            Ok(Err(e)) => {
                error!("request {id} failed: {e}");
                RequestState::Error {
                    error: e.to_string(),
                }
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("request {id} panicked: {message}");
                RequestState::Error {
                    error: format!("internal error: {message}"),
                }
            }
        };
        self.transition(&id, state);
    }

    /// Run `request` to completion on the current task.
    ///
    /// Order: cache lookup (cacheable requests only), prompt resolution,
    /// adapter creation, direct or chunked call, then the cache write and
    /// conversation context update. A forced refresh skips the lookup but
    /// still refreshes the entry.
    pub async fn execute(&self, request: &ChatRequest) -> Result<SummaryResult, SummarizeError> {
        if let Some(result) = self.cached_result(request).await {
            self.remember_context(request, &result.summary);
            return Ok(result);
        }

        let resolved = prompt::resolve(
            &request.messages,
            request.language,
            request.custom_prompts.as_ref(),
        );
        let adapter = self.inner.registry.create(
            request.provider,
            ProviderConfig::from_request(request, self.inner.config.request_timeout),
        )?;
        let completion = self
            .inner
            .chunker
            .run(adapter.as_ref(), &resolved.messages, &resolved.params)
            .await?;

        let result = SummaryResult {
            summary: completion.text,
            provider: request.provider,
            model: Some(completion.model),
            cached: false,
        };

        if let Some(key) = request.content_key().filter(|_| request.is_single_turn()) {
            let _ = self
                .inner
                .cache
                .set(key, request.language, &result.summary, request.provider)
                .await
                .inspect_err(|e| warn!("cache write for {key} failed: {e}"));
        }
        self.remember_context(request, &result.summary);
        Ok(result)
    }

    /// Synchronous chat path: run `request` and always return a response.
    #[instrument(skip_all, fields(provider = %request.provider))]
    pub async fn chat(&self, request: ChatRequest) -> LlmResponse {
        let outcome = match AssertUnwindSafe(self.execute(&request)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("chat request panicked: {message}");
                return LlmResponse {
                    summary: None,
                    provider: request.provider,
                    model: None,
                    cached: false,
                    error: Some(format!("internal error: {message}")),
                };
            }
        };
        if let Err(e) = &outcome {
            error!("chat request failed: {e}");
        }
        LlmResponse::from_outcome(request.provider, outcome)
    }

    /// Drop request records older than the retention window, whatever their
    /// status. Returns how many were removed.
    pub fn clear_expired(&self) -> usize {
        let now = self.inner.clock.now();
        let retention = chrono::Duration::from_std(self.inner.config.retention)
            .unwrap_or(chrono::Duration::MAX);
        let mut requests = self.requests();
        let before = requests.len();
        requests.retain(|_, r| now.signed_duration_since(r.created_at) <= retention);
        let removed = before - requests.len();
        if removed > 0 {
            debug!("cleared {removed} expired request records");
        }
        removed
    }

    /// Run [`clear_expired`](Self::clear_expired) every cleanup interval
    /// until `shutdown` is cancelled.
    pub fn spawn_janitor(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let this = self.clone();
        let period = self
            .inner
            .config
            .cleanup_interval
            .max(std::time::Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        this.clear_expired();
                    }
                }
            }
            debug!("janitor stopped");
        })
    }

    /// Stored conversation for `context_id`.
    pub fn context(&self, context_id: &str) -> Option<Vec<Message>> {
        self.contexts().get(context_id).cloned()
    }

    /// Forget the conversation for `context_id`. Returns whether one existed.
    pub fn clear_context(&self, context_id: &str) -> bool {
        self.contexts().remove(context_id).is_some()
    }

    pub async fn cache_stats(&self) -> Result<CacheStats, StoreError> {
        self.inner.cache.stats().await
    }

    pub async fn clear_cache(&self) -> Result<(), StoreError> {
        self.inner.cache.clear().await
    }

    // ── Internals ──────────────────────────────────────────────────

    fn requests(&self) -> MutexGuard<'_, HashMap<String, PendingRequest>> {
        self.inner.requests.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn contexts(&self) -> MutexGuard<'_, HashMap<String, Vec<Message>>> {
        self.inner.contexts.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply a state change to `id`. Terminal records never change again.
    fn transition(&self, id: &str, state: RequestState) -> bool {
        let mut requests = self.requests();
        let Some(record) = requests.get_mut(id) else {
            debug!("request {id} no longer tracked; dropping {} transition", state.name());
            return false;
        };
        if record.is_terminal() {
            warn!(
                "request {id} is already {}; ignoring {} transition",
                record.state.name(),
                state.name()
            );
            return false;
        }
        debug!("request {id}: {} -> {}", record.state.name(), state.name());
        record.state = state;
        true
    }

    /// Fresh cache entry for a cacheable request. Store failures count as a
    /// miss.
    async fn cached_result(&self, request: &ChatRequest) -> Option<SummaryResult> {
        if !request.is_cacheable() {
            return None;
        }
        let key = request.content_key()?;
        let entry = self
            .inner
            .cache
            .get(key, request.language)
            .await
            .inspect_err(|e| warn!("cache read for {key} failed: {e}"))
            .ok()??;
        Some(SummaryResult {
            summary: entry.summary,
            provider: entry.provider,
            model: None,
            cached: true,
        })
    }

    fn remember_context(&self, request: &ChatRequest, reply: &str) {
        let Some(context_id) = request.context_id.as_deref().filter(|c| !c.is_empty()) else {
            return;
        };
        let mut messages = request.messages.clone();
        messages.push(Message::assistant(reply));
        self.contexts().insert(context_id.to_string(), messages);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::ProviderKind;
    use crate::cache::MemoryKvStore;
    use crate::clock::ManualClock;
    use crate::provider::{
        Completion, CompletionFuture, ProviderAdapter, SamplingParams,
    };

    struct Echo;

    impl ProviderAdapter for Echo {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Ollama
        }

        fn initialize(&mut self, _config: ProviderConfig) -> Result<(), SummarizeError> {
            Ok(())
        }

        fn call<'a>(
            &'a self,
            messages: &'a [Message],
            _params: &'a SamplingParams,
        ) -> CompletionFuture<'a> {
            let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Box::pin(async move {
                if last.contains("panic") {
                    panic!("adapter exploded");
                }
                Ok(Completion {
                    text: format!("echo: {}", last.len()),
                    model: "echo-1".into(),
                })
            })
        }
    }

    fn orchestrator(clock: Arc<ManualClock>) -> Orchestrator {
        let cache = SummaryCache::new(Arc::new(MemoryKvStore::new())).with_clock(clock.clone());
        let registry = ProviderRegistry::new().with(ProviderKind::Ollama, || Box::new(Echo));
        Orchestrator::new_with_clock(
            OrchestratorConfig::default().with_retention(Duration::from_secs(60)),
            cache,
            registry,
            clock,
        )
    }

    async fn wait_terminal(orch: &Orchestrator, id: &str) -> PendingRequest {
        for _ in 0..200 {
            if let Some(record) = orch.status(id).filter(|r| r.is_terminal()) {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("request {id} never finished");
    }

    #[tokio::test]
    async fn submit_uses_supplied_id() {
        let orch = orchestrator(Arc::new(ManualClock::default()));
        let request = ChatRequest::summarize(ProviderKind::Ollama, "text");
        let id = orch.submit(request, Some("client-7".into())).await;
        assert_eq!(id, "client-7");
        let record = wait_terminal(&orch, &id).await;
        assert_eq!(record.result().unwrap().model.as_deref(), Some("echo-1"));
    }

    #[tokio::test]
    async fn panicking_adapter_ends_in_error_state() {
        let orch = orchestrator(Arc::new(ManualClock::default()));
        let request = ChatRequest::new(ProviderKind::Ollama, vec![
            Message::user("a"),
            Message::assistant("b"),
            Message::user("please panic"),
        ]);
        let id = orch.submit(request, None).await;
        let record = wait_terminal(&orch, &id).await;
        assert!(record.error().unwrap().contains("adapter exploded"));
        assert!(record.result().is_none());
    }

    #[tokio::test]
    async fn unregistered_provider_is_reported_not_raised() {
        let orch = orchestrator(Arc::new(ManualClock::default()));
        let response = orch
            .chat(ChatRequest::summarize(ProviderKind::Anthropic, "text"))
            .await;
        assert!(response.summary.is_none());
        assert!(response.error.unwrap().contains("no adapter registered"));
    }

    #[tokio::test]
    async fn terminal_state_is_never_overwritten() {
        let orch = orchestrator(Arc::new(ManualClock::default()));
        let id = orch
            .submit(ChatRequest::summarize(ProviderKind::Ollama, "text"), None)
            .await;
        let done = wait_terminal(&orch, &id).await;
        assert!(!orch.transition(
            &id,
            RequestState::Error {
                error: "late".into()
            }
        ));
        assert_eq!(orch.status(&id).unwrap(), done);
    }

    #[tokio::test]
    async fn clear_expired_respects_retention() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let orch = orchestrator(clock.clone());
        let old = orch
            .submit(ChatRequest::summarize(ProviderKind::Ollama, "old"), None)
            .await;
        wait_terminal(&orch, &old).await;

        clock.advance(chrono::Duration::seconds(45));
        let young = orch
            .submit(ChatRequest::summarize(ProviderKind::Ollama, "young"), None)
            .await;
        wait_terminal(&orch, &young).await;

        clock.advance(chrono::Duration::seconds(30));
        assert_eq!(orch.clear_expired(), 1);
        assert!(orch.status(&old).is_none());
        assert!(orch.status(&young).is_some());
    }

    #[tokio::test]
    async fn context_is_recorded_and_cleared() {
        let orch = orchestrator(Arc::new(ManualClock::default()));
        let request = ChatRequest::new(ProviderKind::Ollama, vec![
            Message::user("hi"),
            Message::assistant("hello"),
            Message::user("sum up"),
        ])
        .with_context_id("tab-1");
        let response = orch.chat(request).await;
        assert_eq!(response.summary.as_deref(), Some("echo: 6"));

        let context = orch.context("tab-1").unwrap();
        assert_eq!(context.len(), 4);
        assert_eq!(context[3], Message::assistant("echo: 6"));

        assert!(orch.clear_context("tab-1"));
        assert!(orch.context("tab-1").is_none());
        assert!(!orch.clear_context("tab-1"));
    }

    #[tokio::test]
    async fn forced_refresh_skips_lookup_but_rewrites_entry() {
        let orch = orchestrator(Arc::new(ManualClock::default()));
        orch.cache()
            .set("k", crate::Language::English, "stale", ProviderKind::Ollama)
            .await
            .unwrap();

        let request = ChatRequest::summarize(ProviderKind::Ollama, "fresh text")
            .with_content_key("k")
            .with_force_refresh(true);
        let response = orch.chat(request).await;
        assert!(!response.cached);
        assert!(response.summary.unwrap().starts_with("echo"));

        let entry = orch
            .cache()
            .get("k", crate::Language::English)
            .await
            .unwrap()
            .unwrap();
        assert!(entry.summary.starts_with("echo"));
    }

    #[tokio::test]
    async fn janitor_sweeps_until_cancelled() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = SummaryCache::new(Arc::new(MemoryKvStore::new()));
        let orch = Orchestrator::new_with_clock(
            OrchestratorConfig::default()
                .with_retention(Duration::from_secs(60))
                .with_cleanup_interval(Duration::from_millis(10)),
            cache,
            ProviderRegistry::new(),
            clock.clone(),
        );
        orch.requests().insert(
            "stale".into(),
            PendingRequest::new("stale", "", clock.now()),
        );
        clock.advance(chrono::Duration::minutes(5));

        let shutdown = CancellationToken::new();
        let handle = orch.spawn_janitor(shutdown.clone());
        for _ in 0..100 {
            if orch.request_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(orch.request_count(), 0);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
