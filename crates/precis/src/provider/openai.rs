//! OpenAI chat completions adapter. Also works against any
//! OpenAI-compatible gateway through the endpoint override.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::http::{build_client, join_url, post_json};
use super::{
    Completion, CompletionFuture, ProviderAdapter, ProviderConfig, ProviderKind, SamplingParams,
    require_api_key,
};
use crate::{Message, SummarizeError};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Chat completion request body.
#[derive(Serialize, Debug)]
pub(crate) struct ChatBody<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Raw API response (internal deserialization target). Shared with other
/// OpenAI-shaped vendors.
#[derive(Deserialize, Debug)]
pub(crate) struct RawChatResponse {
    pub choices: Option<Vec<RawChoice>>,
    pub model: Option<String>,
    pub error: Option<RawApiError>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct RawChoice {
    pub message: RawResponseMessage,
}

#[derive(Deserialize, Debug)]
pub(crate) struct RawResponseMessage {
    pub content: Option<String>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct RawApiError {
    pub message: String,
}

/// Pick the first choice's text out of an OpenAI-shaped response.
pub(crate) fn completion_from_raw(
    kind: ProviderKind,
    requested_model: &str,
    parsed: RawChatResponse,
) -> Result<Completion, SummarizeError> {
    if let Some(err) = parsed.error {
        return Err(SummarizeError::malformed(kind, err.message));
    }
    let text = parsed
        .choices
        .and_then(|c| c.into_iter().next())
        .and_then(|c| c.message.content)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| SummarizeError::malformed(kind, "no content in response"))?;
    Ok(Completion {
        text,
        model: parsed.model.unwrap_or_else(|| requested_model.to_string()),
    })
}

struct Initialized {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

/// Adapter for the OpenAI `/chat/completions` endpoint.
#[derive(Default)]
pub struct OpenAiAdapter {
    state: Option<Initialized>,
}

impl ProviderAdapter for OpenAiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn initialize(&mut self, config: ProviderConfig) -> Result<(), SummarizeError> {
        let api_key = require_api_key(self.kind(), &config)?;
        self.state = Some(Initialized {
            client: build_client(self.kind(), config.timeout)?,
            api_key,
            base_url: config.endpoint.unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            model: config
                .model
                .unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string()),
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
            let bearer = format!("Bearer {}", state.api_key.expose_secret());
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&bearer).map_err(|_| {
                    SummarizeError::configuration(self.kind(), "API key is not a valid header value")
                })?,
            );

            let body = ChatBody {
                model: &state.model,
                messages,
                temperature: params.temperature,
                max_tokens: params.max_tokens,
            };
            let url = join_url(&state.base_url, "/chat/completions");
            let parsed: RawChatResponse =
                post_json(self.kind(), &state.client, &url, headers, &body).await?;
            completion_from_raw(self.kind(), &state.model, parsed)
        })
    }
}
