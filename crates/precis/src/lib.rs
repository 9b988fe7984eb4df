//! Cached, chunk-aware summarization over interchangeable LLM providers.
//!
//! `precis` accepts summarization and chat requests, tracks each one through
//! an asynchronous lifecycle, and answers repeated summaries of the same
//! content from a persistent cache instead of calling a provider again. The
//! central type is the [`Orchestrator`](orchestrator::Orchestrator): submit a
//! [`ChatRequest`], get an id back immediately, and poll
//! [`status`](orchestrator::Orchestrator::status) until the request reaches a
//! terminal state.
//!
//! # Getting started
//!
//! ```ignore
//! use std::sync::Arc;
//! use precis::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(JsonFileKvStore::open("precis-store.json").await?);
//!     let cache = SummaryCache::new(store);
//!     let orchestrator = Orchestrator::new(
//!         OrchestratorConfig::default(),
//!         cache,
//!         ProviderRegistry::with_defaults(),
//!     );
//!
//!     let request = ChatRequest::summarize(
//!         ProviderKind::OpenAi,
//!         "Rust is a multi-paradigm, general-purpose programming language...",
//!     )
//!     .with_api_key(std::env::var("OPENAI_API_KEY")?)
//!     .with_content_key("https://en.wikipedia.org/wiki/Rust");
//!
//!     let id = orchestrator.submit(request, None).await;
//!     // ... later
//!     println!("{:?}", orchestrator.status(&id));
//!     Ok(())
//! }
//! ```
//!
//! # Where to find things
//!
//! - **Submit and poll requests:** [`orchestrator::Orchestrator`], with
//!   [`orchestrator::OrchestratorConfig`] for retention and thresholds and
//!   [`orchestrator::PendingRequest`] for the lifecycle record.
//! - **Talk to a vendor:** the [`ProviderAdapter`](provider::ProviderAdapter)
//!   trait and the concrete adapters in [`provider`]. Register custom adapters
//!   in a [`ProviderRegistry`](provider::ProviderRegistry).
//! - **Shape prompts:** [`prompt::resolve`] turns raw text or a conversation
//!   into provider-ready messages and sampling parameters.
//! - **Handle huge inputs:** [`context::ContextChunker`] splits oversized
//!   conversations and carries a running synopsis across chunks.
//! - **Cache summaries:** [`cache::SummaryCache`] on top of any
//!   [`KvStore`](cache::KvStore).
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`orchestrator`] | Request lifecycle, cache decisions, background cleanup |
//! | [`provider`] | Adapter trait, registry, OpenAI / Anthropic / OpenRouter / Ollama adapters |
//! | [`prompt`] | Default and custom prompt templates per language |
//! | [`context`] | Token estimation and recursive chunking |
//! | [`cache`] | Summary cache and key-value persistence |
//! | [`error`] | Failure taxonomy shared by all of the above |

pub mod cache;
pub mod clock;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod prelude;
pub mod prompt;
pub mod provider;

use std::collections::HashMap;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

pub use error::{ErrorHint, StoreError, SummarizeError};
pub use provider::ProviderKind;

// ── Constants ──────────────────────────────────────────────────────

/// Transport-level timeout applied to every provider HTTP client.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Maximum tokens for synopsis calls made between chunks.
pub const SYNOPSIS_MAX_TOKENS: u32 = 1024;

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A message in the conversation. Order within a sequence is meaningful.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Output language for summaries. Selects the default prompt templates.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    English,
    Chinese,
}

impl Language {
    /// Stable identifier used in cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::English => "english",
            Language::Chinese => "chinese",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied override for one language's prompts and sampling.
///
/// Any field left `None` falls back to the built-in default for that
/// language. The `user` template may contain a `{content}` placeholder; if it
/// does not, the content is appended after a blank line.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PromptTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Custom prompt templates keyed by language.
pub type CustomPrompts = HashMap<Language, PromptTemplate>;

// ── Request types ──────────────────────────────────────────────────

/// A summarization or chat request. Immutable once submitted.
///
/// A request whose `messages` is a single user message is treated as raw
/// content to summarize; anything else is a conversation passed through to
/// the provider as-is.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub provider: ProviderKind,
    #[serde(default, skip_serializing)]
    pub api_key: Option<SecretString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub language: Language,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_prompts: Option<CustomPrompts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_key: Option<String>,
    #[serde(default)]
    pub force_refresh: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
}

impl ChatRequest {
    /// A conversation request with every optional field unset.
    pub fn new(provider: ProviderKind, messages: Vec<Message>) -> Self {
        Self {
            messages,
            provider,
            api_key: None,
            endpoint: None,
            routing_key: None,
            model: None,
            language: Language::default(),
            custom_prompts: None,
            content_key: None,
            force_refresh: false,
            context_id: None,
        }
    }

    /// A single-turn summarization request for `content`.
    pub fn summarize(provider: ProviderKind, content: impl Into<String>) -> Self {
        Self::new(provider, vec![Message::user(content)])
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_routing_key(mut self, key: impl Into<String>) -> Self {
        self.routing_key = Some(key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn with_custom_prompt(mut self, language: Language, template: PromptTemplate) -> Self {
        self.custom_prompts
            .get_or_insert_with(HashMap::new)
            .insert(language, template);
        self
    }

    pub fn with_content_key(mut self, key: impl Into<String>) -> Self {
        self.content_key = Some(key.into());
        self
    }

    pub fn with_force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    pub fn with_context_id(mut self, id: impl Into<String>) -> Self {
        self.context_id = Some(id.into());
        self
    }

    /// The content key, or `None` when absent or empty.
    pub fn content_key(&self) -> Option<&str> {
        self.content_key.as_deref().filter(|k| !k.is_empty())
    }

    /// Whether this is a single-turn, user-only request.
    pub fn is_single_turn(&self) -> bool {
        matches!(self.messages.as_slice(), [only] if only.role == MessageRole::User)
    }

    /// Cache eligibility: non-empty content key, no forced refresh, and
    /// exactly one user message. Multi-turn chat is never cached.
    pub fn is_cacheable(&self) -> bool {
        self.content_key().is_some() && !self.force_refresh && self.is_single_turn()
    }
}

// ── Response types ─────────────────────────────────────────────────

/// Payload of a completed request.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResult {
    pub summary: String,
    pub provider: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// True when the summary was served from the cache.
    #[serde(default)]
    pub cached: bool,
}

/// Response of the synchronous chat path. Carries either `summary` or
/// `error`, never both.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LlmResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub provider: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LlmResponse {
    pub fn from_outcome(provider: ProviderKind, outcome: Result<SummaryResult, SummarizeError>) -> Self {
        match outcome {
            Ok(result) => Self {
                summary: Some(result.summary),
                provider: result.provider,
                model: result.model,
                cached: result.cached,
                error: None,
            },
            Err(e) => Self {
                summary: None,
                provider,
                model: None,
                cached: false,
                error: Some(e.to_string()),
            },
        }
    }
}
