//! Anthropic Messages API adapter.
//!
//! Anthropic takes the system prompt as a top-level field rather than as a
//! message, so system-role messages are hoisted out of the sequence (joined
//! in order) before sending. User and assistant messages keep their order.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::http::{build_client, join_url, post_json};
use super::{
    Completion, CompletionFuture, ProviderAdapter, ProviderConfig, ProviderKind, SamplingParams,
    require_api_key,
};
use crate::{Message, MessageRole, SummarizeError};

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const ANTHROPIC_DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const API_VERSION: &str = "2023-06-01";

#[derive(Serialize, Debug)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Serialize, Debug)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    model: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

fn to_request<'a>(
    model: &'a str,
    messages: &'a [Message],
    params: &SamplingParams,
) -> AnthropicRequest<'a> {
    let system_parts: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == MessageRole::System)
        .map(|m| m.content.as_str())
        .collect();
    let system = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));

    let messages = messages
        .iter()
        .filter_map(|m| match m.role {
            MessageRole::System => None,
            MessageRole::User => Some(AnthropicMessage {
                role: "user",
                content: &m.content,
            }),
            MessageRole::Assistant => Some(AnthropicMessage {
                role: "assistant",
                content: &m.content,
            }),
        })
        .collect();

    AnthropicRequest {
        model,
        max_tokens: params.max_tokens,
        temperature: params.temperature,
        system,
        messages,
    }
}

fn completion_from_response(
    requested_model: &str,
    resp: AnthropicResponse,
) -> Result<Completion, SummarizeError> {
    let text: String = resp
        .content
        .into_iter()
        .filter(|b| b.block_type == "text")
        .filter_map(|b| b.text)
        .collect::<Vec<_>>()
        .join("");
    if text.trim().is_empty() {
        return Err(SummarizeError::malformed(
            ProviderKind::Anthropic,
            "no text content in response",
        ));
    }
    Ok(Completion {
        text,
        model: resp.model.unwrap_or_else(|| requested_model.to_string()),
    })
}

struct Initialized {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

/// Adapter for Anthropic's `/v1/messages` endpoint.
#[derive(Default)]
pub struct AnthropicAdapter {
    state: Option<Initialized>,
}

impl ProviderAdapter for AnthropicAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn initialize(&mut self, config: ProviderConfig) -> Result<(), SummarizeError> {
        let api_key = require_api_key(self.kind(), &config)?;
        self.state = Some(Initialized {
            client: build_client(self.kind(), config.timeout)?,
            api_key,
            base_url: config
                .endpoint
                .unwrap_or_else(|| ANTHROPIC_BASE_URL.to_string()),
            model: config
                .model
                .unwrap_or_else(|| ANTHROPIC_DEFAULT_MODEL.to_string()),
        });
        Ok(())
    }

    fn call<'a>(
        &'a self,
        messages: &'a [Message],
        params: &'a SamplingParams,
    ) -> CompletionFuture<'a> {
        Box::pin(async move {
            let state = self.state.as_ref().ok_or_else(|| {
                SummarizeError::configuration(self.kind(), "adapter used before initialize")
            })?;

            let mut headers = HeaderMap::new();
            headers.insert(
                HeaderName::from_static("x-api-key"),
                HeaderValue::from_str(state.api_key.expose_secret()).map_err(|_| {
                    SummarizeError::configuration(self.kind(), "API key is not a valid header value")
                })?,
            );
            headers.insert(
                HeaderName::from_static("anthropic-version"),
                HeaderValue::from_static(API_VERSION),
            );

            let body = to_request(&state.model, messages, params);
            let url = join_url(&state.base_url, "/v1/messages");
            let resp: AnthropicResponse =
                post_json(self.kind(), &state.client, &url, headers, &body).await?;
            completion_from_response(&state.model, resp)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_messages_are_hoisted_in_order() {
        let messages = vec![
            Message::system("rule one"),
            Message::user("question"),
            Message::system("rule two"),
            Message::assistant("answer"),
        ];
        let params = SamplingParams {
            temperature: 0.2,
            max_tokens: 100,
        };
        let req = to_request("claude", &messages, &params);
        assert_eq!(req.system.as_deref(), Some("rule one\n\nrule two"));
        let roles: Vec<_> = req.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["user", "assistant"]);
    }

    #[test]
    fn no_system_field_without_system_messages() {
        let messages = vec![Message::user("q")];
        let params = SamplingParams {
            temperature: 0.2,
            max_tokens: 100,
        };
        let json = serde_json::to_value(to_request("claude", &messages, &params)).unwrap();
        assert!(json.get("system").is_none());
    }

    #[test]
    fn text_blocks_are_concatenated() {
        let resp: AnthropicResponse = serde_json::from_str(
            r#"{"model":"claude-x","content":[{"type":"text","text":"Hello "},{"type":"tool_use","id":"t"},{"type":"text","text":"world"}]}"#,
        )
        .unwrap();
        let completion = completion_from_response("claude", resp).unwrap();
        assert_eq!(completion.text, "Hello world");
        assert_eq!(completion.model, "claude-x");
    }

    #[test]
    fn empty_content_is_malformed() {
        let resp: AnthropicResponse = serde_json::from_str(r#"{"content":[]}"#).unwrap();
        assert!(completion_from_response("claude", resp).is_err());
    }
}
