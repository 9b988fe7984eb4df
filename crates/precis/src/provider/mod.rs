//! Provider adapters: one uniform interface over each LLM vendor's wire
//! protocol.
//!
//! - [`ProviderAdapter`]: the contract. `initialize` once with credentials,
//!   then `call` with already-resolved messages and sampling parameters.
//! - [`ProviderRegistry`]: maps a [`ProviderKind`] to a factory producing a
//!   fresh, uninitialized adapter for each request.
//! - [`openai`], [`anthropic`], [`openrouter`], [`ollama`]: the concrete
//!   adapters.
//!
//! Adapters make exactly one HTTP attempt per call and never panic on a
//! non-2xx response; they convert it into a [`SummarizeError`].

pub mod anthropic;
mod http;
pub mod ollama;
pub mod openai;
pub mod openrouter;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::{ChatRequest, DEFAULT_REQUEST_TIMEOUT, Message, SummarizeError};

pub use anthropic::AnthropicAdapter;
pub use ollama::OllamaAdapter;
pub use openai::OpenAiAdapter;
pub use openrouter::OpenRouterAdapter;

/// Supported LLM vendors.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    OpenRouter,
    Ollama,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::OpenRouter,
        ProviderKind::Ollama,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::Ollama => "ollama",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown provider '{s}'"))
    }
}

/// Sampling parameters resolved from the prompt templates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Everything an adapter needs from the request to talk to its vendor.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: Option<SecretString>,
    /// Base URL override (self-hosted gateways, proxies, tests).
    pub endpoint: Option<String>,
    /// Vendor-specific routing hint. OpenRouter reads it as a provider order.
    pub routing_key: Option<String>,
    pub model: Option<String>,
    pub timeout: Duration,
}

impl ProviderConfig {
    pub fn from_request(request: &ChatRequest, timeout: Duration) -> Self {
        Self {
            api_key: request.api_key.clone(),
            endpoint: request.endpoint.clone(),
            routing_key: request.routing_key.clone(),
            model: request.model.clone(),
            timeout,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: None,
            routing_key: None,
            model: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Normalized result of one provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub model: String,
}

/// Type alias to keep adapter signatures readable.
pub type CompletionFuture<'a> = BoxFuture<'a, Result<Completion, SummarizeError>>;

/// Uniform interface over one LLM vendor.
///
/// An adapter keeps no state between calls beyond what `initialize` set.
/// Calling before `initialize` yields [`SummarizeError::Configuration`].
///
/// Uses boxed futures so that the trait is dyn-compatible and adapters can be
/// selected at runtime through the [`ProviderRegistry`].
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Validate credentials and build the HTTP client.
    fn initialize(&mut self, config: ProviderConfig) -> Result<(), SummarizeError>;

    /// Send the messages and return the model's reply.
    fn call<'a>(&'a self, messages: &'a [Message], params: &'a SamplingParams)
    -> CompletionFuture<'a>;

    /// Variant for providers that natively handle larger windows. The
    /// chunker sends chunk calls through here; the default is `call`.
    fn call_large_context<'a>(
        &'a self,
        messages: &'a [Message],
        params: &'a SamplingParams,
    ) -> CompletionFuture<'a> {
        self.call(messages, params)
    }
}

/// Produces a fresh, uninitialized adapter.
pub type AdapterFactory = Arc<dyn Fn() -> Box<dyn ProviderAdapter> + Send + Sync>;

/// Registry of adapter factories, indexed by provider.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: HashMap<ProviderKind, AdapterFactory>,
}

impl ProviderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in adapter.
    pub fn with_defaults() -> Self {
        Self::new()
            .with(ProviderKind::OpenAi, || Box::new(OpenAiAdapter::default()))
            .with(ProviderKind::Anthropic, || {
                Box::new(AnthropicAdapter::default())
            })
            .with(ProviderKind::OpenRouter, || {
                Box::new(OpenRouterAdapter::default())
            })
            .with(ProviderKind::Ollama, || Box::new(OllamaAdapter::default()))
    }

    /// Register (or replace) the factory for `kind`.
    pub fn register<F>(&mut self, kind: ProviderKind, factory: F)
    where
        F: Fn() -> Box<dyn ProviderAdapter> + Send + Sync + 'static,
    {
        self.factories.insert(kind, Arc::new(factory));
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<F>(mut self, kind: ProviderKind, factory: F) -> Self
    where
        F: Fn() -> Box<dyn ProviderAdapter> + Send + Sync + 'static,
    {
        self.register(kind, factory);
        self
    }

    /// A fresh adapter for `kind`, already initialized with `config`.
    pub fn create(
        &self,
        kind: ProviderKind,
        config: ProviderConfig,
    ) -> Result<Box<dyn ProviderAdapter>, SummarizeError> {
        let factory = self
            .factories
            .get(&kind)
            .ok_or_else(|| SummarizeError::configuration(kind, "no adapter registered"))?;
        let mut adapter = factory();
        adapter.initialize(config)?;
        Ok(adapter)
    }

    pub fn kinds(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<_> = self.factories.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

/// Require an API key, returning a configuration error naming the provider.
pub(crate) fn require_api_key(
    kind: ProviderKind,
    config: &ProviderConfig,
) -> Result<SecretString, SummarizeError> {
    use secrecy::ExposeSecret;
    match &config.api_key {
        Some(key) if !key.expose_secret().trim().is_empty() => Ok(key.clone()),
        _ => Err(SummarizeError::configuration(kind, "missing API key")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_round_trips_through_strings() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.as_str().parse::<ProviderKind>(), Ok(kind));
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
        assert!("gpt".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn default_registry_has_every_provider() {
        let registry = ProviderRegistry::with_defaults();
        assert_eq!(registry.kinds().len(), ProviderKind::ALL.len());
    }

    #[test]
    fn create_without_factory_is_configuration_error() {
        let registry = ProviderRegistry::new();
        let err = registry
            .create(ProviderKind::OpenAi, ProviderConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, SummarizeError::Configuration { .. }));
    }

    #[test]
    fn create_without_api_key_fails_for_keyed_providers() {
        let registry = ProviderRegistry::with_defaults();
        for kind in [
            ProviderKind::OpenAi,
            ProviderKind::Anthropic,
            ProviderKind::OpenRouter,
        ] {
            let err = registry
                .create(kind, ProviderConfig::default())
                .err()
                .unwrap();
            assert!(err.to_string().contains("missing API key"), "{kind}: {err}");
        }
        assert!(
            registry
                .create(ProviderKind::Ollama, ProviderConfig::default())
                .is_ok()
        );
    }
}
