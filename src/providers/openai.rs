//! OpenAI chat completions provider
//!
//! Also serves Ollama, whose `/v1/chat/completions` endpoint speaks the same
//! streaming format: `data:` events carrying `choices[0].delta.content`,
//! terminated by `data: [DONE]`.

use crate::config::{OllamaConfig, OpenAiConfig};
use crate::conversation::{Message, Role};
use crate::error::{ParleyError, Result};
use crate::providers::base::{ensure_success, ChatRequest, DeltaStream, Provider, ProviderKind};
use crate::providers::sse::sse_data;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Provider for OpenAI-compatible chat completion endpoints
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: Client,
    kind: ProviderKind,
    api_base: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    stream: bool,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: &'static str,
    content: OpenAiContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum OpenAiContent {
    Text(String),
    Parts(Vec<OpenAiPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OpenAiPart {
    Text { text: String },
    ImageUrl { image_url: OpenAiImageUrl },
}

#[derive(Debug, Serialize)]
struct OpenAiImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    #[serde(default)]
    delta: OpenAiDelta,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiDelta {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiProvider {
    /// Create a provider for the OpenAI API
    ///
    /// # Examples
    ///
    /// ```
    /// use parley::config::OpenAiConfig;
    /// use parley::providers::OpenAiProvider;
    /// use std::time::Duration;
    ///
    /// let provider = OpenAiProvider::new(&OpenAiConfig::default(), "sk-test".into(), Duration::from_secs(30));
    /// assert!(provider.is_ok());
    /// ```
    pub fn new(config: &OpenAiConfig, api_key: String, timeout: Duration) -> Result<Self> {
        let api_base = config
            .api_base
            .clone()
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        tracing::info!("Initialized OpenAI provider: api_base={}", api_base);
        Self::build(ProviderKind::OpenAi, api_base, Some(api_key), timeout)
    }

    /// Create a provider for a local Ollama server
    pub fn ollama(config: &OllamaConfig, timeout: Duration) -> Result<Self> {
        let api_base = format!("{}/v1", config.host.trim_end_matches('/'));

        tracing::info!("Initialized Ollama provider: host={}", config.host);
        Self::build(ProviderKind::Ollama, api_base, None, timeout)
    }

    fn build(
        kind: ProviderKind,
        api_base: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .user_agent(concat!("parley/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ParleyError::Provider(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            kind,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn convert_request(&self, request: &ChatRequest) -> OpenAiRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.system_prompt.is_empty() {
            messages.push(OpenAiMessage {
                role: "system",
                content: OpenAiContent::Text(request.system_prompt.clone()),
            });
        }
        messages.extend(request.messages.iter().map(convert_message));

        OpenAiRequest {
            model: request.model.clone(),
            messages,
            stream: true,
            temperature: request.temperature,
            max_tokens: request.max_output_tokens,
        }
    }
}

fn convert_message(message: &Message) -> OpenAiMessage {
    let role = match message.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };

    let images: Vec<OpenAiPart> = message
        .images()
        .map(|image| OpenAiPart::ImageUrl {
            image_url: OpenAiImageUrl {
                url: format!("data:{};base64,{}", image.mime_type, image.payload),
            },
        })
        .collect();

    let content = if images.is_empty() {
        OpenAiContent::Text(message.content.clone())
    } else {
        let mut parts = vec![OpenAiPart::Text {
            text: message.content.clone(),
        }];
        parts.extend(images);
        OpenAiContent::Parts(parts)
    };

    OpenAiMessage { role, content }
}

/// Decode chat completion event payloads into text deltas
///
/// Malformed payloads are skipped; `[DONE]` ends the stream.
pub fn decode_stream<S>(events: S) -> DeltaStream
where
    S: Stream<Item = Result<String>> + Send + 'static,
{
    Box::pin(async_stream::try_stream! {
        futures::pin_mut!(events);

        while let Some(payload) = events.next().await {
            let payload = payload?;
            let payload = payload.trim();
            if payload == "[DONE]" {
                break;
            }

            let chunk: OpenAiStreamChunk = match serde_json::from_str(payload) {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::debug!("Skipping malformed stream chunk: {}", e);
                    continue;
                }
            };

            if let Some(error) = chunk.error {
                Err(ParleyError::Provider(format!("Stream error: {}", error)))?;
            }

            let delta = chunk
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content)
                .unwrap_or_default();
            if !delta.is_empty() {
                yield delta;
            }
        }
    })
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn stream_chat(&self, request: &ChatRequest) -> Result<DeltaStream> {
        let url = format!("{}/chat/completions", self.api_base);
        let body = self.convert_request(request);

        tracing::debug!(
            "Sending {} request: model={}, {} messages",
            self.kind,
            body.model,
            body.messages.len()
        );

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(ParleyError::Http)?;
        let response = ensure_success(self.kind, response).await?;

        Ok(decode_stream(sse_data(response.bytes_stream())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Attachment;

    fn events(payloads: &[&str]) -> impl Stream<Item = Result<String>> + Send + 'static {
        let items: Vec<Result<String>> = payloads.iter().map(|p| Ok(p.to_string())).collect();
        futures::stream::iter(items)
    }

    async fn deltas(payloads: &[&str]) -> Vec<String> {
        decode_stream(events(payloads))
            .map(|d| d.unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_decode_content_deltas() {
        let out = deltas(&[
            r#"{"choices":[{"delta":{"role":"assistant"}}]}"#,
            r#"{"choices":[{"delta":{"content":"Hel"}}]}"#,
            r#"{"choices":[{"delta":{"content":"lo "}}]}"#,
            "[DONE]",
            r#"{"choices":[{"delta":{"content":"ignored"}}]}"#,
        ])
        .await;
        assert_eq!(out, vec!["Hel".to_string(), "lo ".to_string()]);
    }

    #[tokio::test]
    async fn test_malformed_chunks_are_skipped() {
        let out = deltas(&[
            r#"{"choices":[{"delta":{"content":"A"}}]}"#,
            "{not json",
            r#"{"choices":[]}"#,
            r#"{"choices":[{"delta":{"content":"B"}}]}"#,
        ])
        .await;
        assert_eq!(out, vec!["A".to_string(), "B".to_string()]);
    }

    #[tokio::test]
    async fn test_error_payload_fails_stream() {
        let results: Vec<Result<String>> =
            decode_stream(events(&[r#"{"error":{"message":"rate_limit"}}"#]))
                .collect()
                .await;
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn test_convert_request_includes_system_and_images() {
        let provider =
            OpenAiProvider::new(&OpenAiConfig::default(), "k".into(), Duration::from_secs(5))
                .unwrap();
        let message = Message::user("what is this?")
            .with_attachments(vec![Attachment::binary("cat.png", "image/png", b"png")]);
        let request = ChatRequest {
            model: "gpt-4o-mini".into(),
            system_prompt: "Be nice.".into(),
            messages: vec![Message::assistant("hi"), message],
            temperature: 0.5,
            max_output_tokens: 100,
        };

        let json = serde_json::to_value(provider.convert_request(&request)).unwrap();
        assert_eq!(json["stream"], true);
        assert_eq!(json["max_tokens"], 100);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        let parts = json["messages"][2]["content"].as_array().unwrap();
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["type"], "image_url");
        assert!(parts[1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_ollama_uses_v1_endpoint_without_key() {
        let config = OllamaConfig {
            host: "http://localhost:11434/".into(),
            model: "llama3.2:latest".into(),
        };
        let provider = OpenAiProvider::ollama(&config, Duration::from_secs(5)).unwrap();
        assert_eq!(provider.api_base, "http://localhost:11434/v1");
        assert!(provider.api_key.is_none());
        assert_eq!(provider.kind(), ProviderKind::Ollama);
    }
}
