//! Convenience re-exports for common `precis` types.
//!
//! ```ignore
//! use precis::prelude::*;
//! ```
//!
//! Covers building requests, wiring an orchestrator, and reading results.
//! Adapter internals and chunking details stay in their modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{
    ChatRequest, CustomPrompts, Language, LlmResponse, Message, MessageRole, PromptTemplate,
    SummarizeError, SummaryResult,
};

// ── Orchestration ───────────────────────────────────────────────────
pub use crate::orchestrator::{Orchestrator, OrchestratorConfig, PendingRequest, RequestState};

// ── Providers ───────────────────────────────────────────────────────
pub use crate::provider::{ProviderAdapter, ProviderKind, ProviderRegistry};

// ── Cache ───────────────────────────────────────────────────────────
pub use crate::cache::{
    CacheSettings, CacheStats, JsonFileKvStore, KvStore, MemoryKvStore, SummaryCache,
};

// ── Context management ──────────────────────────────────────────────
pub use crate::context::ChunkBudget;
