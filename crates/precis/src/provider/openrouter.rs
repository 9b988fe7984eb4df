//! OpenRouter adapter. OpenRouter speaks the OpenAI chat completions shape
//! with a few extras: attribution headers, provider routing preferences and
//! prompt transforms.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use super::http::{build_client, post_json};
use super::openai::{RawChatResponse, completion_from_raw};
use super::{
    Completion, CompletionFuture, ProviderAdapter, ProviderConfig, ProviderKind, SamplingParams,
    require_api_key,
};
use crate::{Message, SummarizeError};

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const OPENROUTER_DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4";
const REFERER: &str = "https://github.com/precis-rs/precis";
const TITLE: &str = "precis";

/// Which upstream providers OpenRouter should try, in order.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ProviderPreferences {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_fallbacks: Option<bool>,
}

impl ProviderPreferences {
    /// Parse a comma-separated routing key (`"anthropic,google"`).
    fn from_routing_key(key: &str) -> Option<Self> {
        let order: Vec<String> = key
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        (!order.is_empty()).then_some(Self {
            order: Some(order),
            allow_fallbacks: None,
        })
    }
}

#[derive(Serialize, Debug)]
struct OpenRouterBody<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<&'a ProviderPreferences>,
    #[serde(skip_serializing_if = "Option::is_none")]
    transforms: Option<Vec<&'static str>>,
}

struct Initialized {
    client: reqwest::Client,
    api_key: SecretString,
    url: String,
    model: String,
    preferences: Option<ProviderPreferences>,
}

/// Adapter for OpenRouter. The endpoint override replaces the full
/// completions URL.
#[derive(Default)]
pub struct OpenRouterAdapter {
    state: Option<Initialized>,
}

impl OpenRouterAdapter {
    async fn send(
        &self,
        messages: &[Message],
        params: &SamplingParams,
        middle_out: bool,
    ) -> Result<Completion, SummarizeError> {
        let state = self.state.as_ref().ok_or_else(|| {
            SummarizeError::configuration(self.kind(), "adapter used before initialize")
        })?;

        let mut headers = HeaderMap::new();
        let bearer = format!("Bearer {}", state.api_key.expose_secret());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&bearer).map_err(|_| {
                SummarizeError::configuration(self.kind(), "API key is not a valid header value")
            })?,
        );
        headers.insert(
            HeaderName::from_static("http-referer"),
            HeaderValue::from_static(REFERER),
        );
        headers.insert(
            HeaderName::from_static("x-title"),
            HeaderValue::from_static(TITLE),
        );

        let body = OpenRouterBody {
            model: &state.model,
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            provider: state.preferences.as_ref(),
            transforms: middle_out.then(|| vec!["middle-out"]),
        };
        let parsed: RawChatResponse =
            post_json(self.kind(), &state.client, &state.url, headers, &body).await?;
        completion_from_raw(self.kind(), &state.model, parsed)
    }
}

impl ProviderAdapter for OpenRouterAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenRouter
    }

    fn initialize(&mut self, config: ProviderConfig) -> Result<(), SummarizeError> {
        let api_key = require_api_key(self.kind(), &config)?;
        self.state = Some(Initialized {
            client: build_client(self.kind(), config.timeout)?,
            api_key,
            url: config.endpoint.unwrap_or_else(|| OPENROUTER_URL.to_string()),
            model: config
                .model
                .unwrap_or_else(|| OPENROUTER_DEFAULT_MODEL.to_string()),
            preferences: config
                .routing_key
                .as_deref()
                .and_then(ProviderPreferences::from_routing_key),
        });
        Ok(())
    }

    fn call<'a>(
        &'a self,
        messages: &'a [Message],
        params: &'a SamplingParams,
    ) -> CompletionFuture<'a> {
        Box::pin(self.send(messages, params, false))
    }

    /// Lets OpenRouter compress the middle of an over-long prompt instead of
    /// rejecting it.
    fn call_large_context<'a>(
        &'a self,
        messages: &'a [Message],
        params: &'a SamplingParams,
    ) -> CompletionFuture<'a> {
        Box::pin(self.send(messages, params, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_key_splits_into_provider_order() {
        let prefs = ProviderPreferences::from_routing_key(" anthropic, google ,").unwrap();
        assert_eq!(
            prefs.order,
            Some(vec!["anthropic".to_string(), "google".to_string()])
        );
        assert!(ProviderPreferences::from_routing_key(" , ").is_none());
    }

    #[test]
    fn body_omits_optional_fields_when_unset() {
        let messages = vec![Message::user("hello")];
        let body = OpenRouterBody {
            model: OPENROUTER_DEFAULT_MODEL,
            messages: &messages,
            temperature: 0.3,
            max_tokens: 512,
            provider: None,
            transforms: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("provider").is_none());
        assert!(json.get("transforms").is_none());
    }

    #[test]
    fn large_context_body_carries_middle_out() {
        let messages = vec![Message::user("hello")];
        let prefs = ProviderPreferences::from_routing_key("anthropic").unwrap();
        let body = OpenRouterBody {
            model: OPENROUTER_DEFAULT_MODEL,
            messages: &messages,
            temperature: 0.3,
            max_tokens: 512,
            provider: Some(&prefs),
            transforms: Some(vec!["middle-out"]),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["transforms"][0], "middle-out");
        assert_eq!(json["provider"]["order"][0], "anthropic");
    }
}
