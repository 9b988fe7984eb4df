//! Ollama adapter for locally hosted models. No API key is needed; if one is
//! supplied it is sent as a bearer token (for reverse proxies in front of
//! Ollama).

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::http::{build_client, join_url, post_json};
use super::{
    Completion, CompletionFuture, ProviderAdapter, ProviderConfig, ProviderKind, SamplingParams,
};
use crate::{Message, SummarizeError};

pub const OLLAMA_BASE_URL: &str = "http://localhost:11434";
pub const OLLAMA_DEFAULT_MODEL: &str = "llama3.1";

#[derive(Serialize, Debug)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize, Debug)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize, Debug)]
struct OllamaResponse {
    model: Option<String>,
    message: Option<OllamaMessage>,
}

#[derive(Deserialize, Debug)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

struct Initialized {
    client: reqwest::Client,
    api_key: Option<SecretString>,
    base_url: String,
    model: String,
}

/// Adapter for Ollama's non-streaming `/api/chat` endpoint.
#[derive(Default)]
pub struct OllamaAdapter {
    state: Option<Initialized>,
}

impl ProviderAdapter for OllamaAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn initialize(&mut self, config: ProviderConfig) -> Result<(), SummarizeError> {
        self.state = Some(Initialized {
            client: build_client(self.kind(), config.timeout)?,
            api_key: config
                .api_key
                .filter(|k| !k.expose_secret().trim().is_empty()),
            base_url: config.endpoint.unwrap_or_else(|| OLLAMA_BASE_URL.to_string()),
            model: config
                .model
                .unwrap_or_else(|| OLLAMA_DEFAULT_MODEL.to_string()),
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
            if let Some(key) = &state.api_key {
                let bearer = format!("Bearer {}", key.expose_secret());
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&bearer).map_err(|_| {
                        SummarizeError::configuration(
                            self.kind(),
                            "API key is not a valid header value",
                        )
                    })?,
                );
            }

            let body = OllamaRequest {
                model: &state.model,
                messages,
                stream: false,
                options: OllamaOptions {
                    temperature: params.temperature,
                    num_predict: params.max_tokens,
                },
            };
            let url = join_url(&state.base_url, "/api/chat");
            let resp: OllamaResponse =
                post_json(self.kind(), &state.client, &url, headers, &body).await?;

            let text = resp
                .message
                .map(|m| m.content)
                .filter(|t| !t.trim().is_empty())
                .ok_or_else(|| SummarizeError::malformed(self.kind(), "no message in response"))?;
            Ok(Completion {
                text,
                model: resp.model.unwrap_or_else(|| state.model.clone()),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_disables_streaming_and_maps_options() {
        let messages = vec![Message::user("hi")];
        let body = OllamaRequest {
            model: "llama3.1",
            messages: &messages,
            stream: false,
            options: OllamaOptions {
                temperature: 0.3,
                num_predict: 400,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_predict"], 400);
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn initialize_without_key_succeeds() {
        let mut adapter = OllamaAdapter::default();
        adapter.initialize(ProviderConfig::default()).unwrap();
        let state = adapter.state.as_ref().unwrap();
        assert_eq!(state.base_url, OLLAMA_BASE_URL);
        assert_eq!(state.model, OLLAMA_DEFAULT_MODEL);
        assert!(state.api_key.is_none());
    }
}
