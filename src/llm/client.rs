use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use futures::future::ready;
use futures::stream::BoxStream;
use reqwest::{Client, Response};
use tracing::{debug, trace, warn};

use super::types::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ErrorEnvelope,
    GenerationRequest,
};
use crate::config::{self, ApiKey, ModelProvider};
use crate::error::{Service, UpstreamError};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const DEEPSEEK_API_BASE: &str = "https://api.deepseek.com/v1";
const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEEPSEEK_DEFAULT_MODEL: &str = "deepseek-chat";
/// Model used for follow-up question generation regardless of the answer backend.
pub const FOLLOW_UP_MODEL: &str = "gpt-4o-mini";
const TEXT_TIMEOUT: Duration = Duration::from_secs(60);
const SSE_DONE: &str = "[DONE]";

pub type TextStream = BoxStream<'static, Result<String, UpstreamError>>;

/// Text-generation capability of a model backend.
/// Implemented by `ChatClient` for production; mock implementations used in tests.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate the complete response in one call.
    async fn generate_text(&self, request: &GenerationRequest) -> Result<String, UpstreamError>;

    /// Generate the response as a stream of text deltas.
    async fn generate_stream(&self, request: &GenerationRequest)
    -> Result<TextStream, UpstreamError>;
}

/// Client for OpenAI-compatible chat completion endpoints. One instance per
/// configured backend.
#[derive(Clone)]
pub struct ChatClient {
    http: Client,
    api_key: ApiKey,
    model: String,
    base_url: String,
}

impl ChatClient {
    /// Returns `None` when the backend's API key is not configured.
    pub fn from_env(http: Client, provider: ModelProvider) -> Option<Self> {
        let api_key = ApiKey::from_env(provider.key_var())?;
        let (base_url, model) = match provider {
            ModelProvider::OpenAi => (
                config::env_or("OPENAI_BASE_URL", OPENAI_API_BASE),
                config::env_or("OPENAI_MODEL", OPENAI_DEFAULT_MODEL),
            ),
            ModelProvider::DeepSeek => (
                config::env_or("DEEPSEEK_BASE_URL", DEEPSEEK_API_BASE),
                config::env_or("DEEPSEEK_MODEL", DEEPSEEK_DEFAULT_MODEL),
            ),
        };
        Some(Self {
            http,
            api_key,
            model,
            base_url,
        })
    }

    /// Same endpoint and key, different model.
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            http,
            api_key: ApiKey::new("test-key").unwrap(),
            model: OPENAI_DEFAULT_MODEL.to_string(),
            base_url: base_url.to_string(),
        }
    }

    async fn send(
        &self,
        request: &GenerationRequest,
        stream: bool,
    ) -> Result<Response, UpstreamError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream,
        };

        let mut builder = self
            .http
            .post(&url)
            .bearer_auth(self.api_key.expose())
            .header("User-Agent", crate::USER_AGENT)
            .json(&body);
        // A whole-request timeout would cut long streams short.
        if !stream {
            builder = builder.timeout(TEXT_TIMEOUT);
        }

        let response = builder
            .send()
            .await
            .map_err(UpstreamError::network(Service::Model))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .ok()
                .and_then(|e| e.error)
                .and_then(|e| e.message)
                .unwrap_or_else(|| {
                    let end = text.floor_char_boundary(200);
                    format!("HTTP {status}: {}", &text[..end])
                });
            warn!(status = %status, model = %self.model, "chat completion failed");
            return Err(UpstreamError::Api {
                service: Service::Model,
                code: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl TextGenerator for ChatClient {
    async fn generate_text(&self, request: &GenerationRequest) -> Result<String, UpstreamError> {
        let response = self.send(request, false).await?;
        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(UpstreamError::network(Service::Model))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| UpstreamError::protocol(Service::Model, "response had no choices"))?;
        debug!(model = %self.model, "chat completion complete");
        Ok(choice.message.content.unwrap_or_default())
    }

    async fn generate_stream(
        &self,
        request: &GenerationRequest,
    ) -> Result<TextStream, UpstreamError> {
        let response = self.send(request, true).await?;
        debug!(model = %self.model, "chat completion stream opened");

        let stream = response
            .bytes_stream()
            .eventsource()
            .take_while(|event| ready(!matches!(event, Ok(e) if e.data == SSE_DONE)))
            .filter_map(|event| {
                ready(match event {
                    Ok(event) => parse_chunk(&event.data).transpose(),
                    Err(e) => Some(Err(UpstreamError::protocol(
                        Service::Model,
                        format!("SSE stream error: {e}"),
                    ))),
                })
            });

        Ok(stream.boxed())
    }
}

/// Extracts the text delta from one SSE data payload. Keep-alive and
/// role-only chunks yield `None`.
fn parse_chunk(data: &str) -> Result<Option<String>, UpstreamError> {
    trace!(data, "chat completion chunk");
    let chunk: ChatCompletionChunk = serde_json::from_str(data).map_err(|e| {
        UpstreamError::protocol(Service::Model, format!("SSE parsing error: {e}"))
    })?;

    if let Some(err) = chunk.error {
        let message = err
            .message
            .unwrap_or_else(|| "An error occurred during streaming".to_string());
        return Err(UpstreamError::protocol(Service::Model, message));
    }

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|text| !text.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_chunk_extracts_delta() {
        let text = parse_chunk(
            r#"{"object":"chat.completion.chunk","choices":[{"delta":{"content":"Bali"}}]}"#,
        )
        .unwrap();
        assert_eq!(text.as_deref(), Some("Bali"));
    }

    #[test]
    fn parse_chunk_skips_role_only_and_empty_choices() {
        assert_eq!(
            parse_chunk(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(),
            None
        );
        assert_eq!(parse_chunk(r#"{"choices":[]}"#).unwrap(), None);
    }

    #[test]
    fn parse_chunk_surfaces_inline_error() {
        let err = parse_chunk(r#"{"error":{"message":"provider error"}}"#).unwrap_err();
        assert!(err.to_string().contains("provider error"));
    }

    #[test]
    fn parse_chunk_rejects_invalid_json() {
        assert!(parse_chunk("not json").is_err());
    }
}
