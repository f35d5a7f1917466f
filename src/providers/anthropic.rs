//! Anthropic messages provider
//!
//! The stream is a sequence of typed events. Only `content_block_delta`
//! carries text; an `error` event aborts the stream. The stream ends when
//! the server closes the connection.

use crate::config::AnthropicConfig;
use crate::conversation::{Message, Role};
use crate::error::{ParleyError, Result};
use crate::providers::base::{ensure_success, ChatRequest, DeltaStream, Provider, ProviderKind};
use crate::providers::sse::sse_data;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Provider for the Anthropic messages API
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    client: Client,
    api_base: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicBlock {
    Text { text: String },
    Image { source: AnthropicImageSource },
}

#[derive(Debug, Serialize)]
struct AnthropicImageSource {
    #[serde(rename = "type")]
    source_type: &'static str,
    media_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicEvent {
    ContentBlockDelta {
        delta: AnthropicDelta,
    },
    Error {
        error: AnthropicErrorBody,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicDelta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    #[serde(rename = "type", default)]
    error_type: String,
    #[serde(default)]
    message: String,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider
    pub fn new(config: &AnthropicConfig, api_key: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .user_agent(concat!("parley/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ParleyError::Provider(format!("Failed to create HTTP client: {}", e)))?;

        let api_base = config
            .api_base
            .clone()
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        tracing::info!("Initialized Anthropic provider: api_base={}", api_base);

        Ok(Self {
            client,
            api_base,
            api_key,
        })
    }

    fn convert_request(request: &ChatRequest) -> AnthropicRequest {
        AnthropicRequest {
            model: request.model.clone(),
            max_tokens: request.max_output_tokens,
            system: if request.system_prompt.is_empty() {
                None
            } else {
                Some(request.system_prompt.clone())
            },
            messages: request.messages.iter().map(convert_message).collect(),
            temperature: request.temperature,
            stream: true,
        }
    }
}

fn convert_message(message: &Message) -> AnthropicMessage {
    let role = match message.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };

    let mut content: Vec<AnthropicBlock> = message
        .images()
        .map(|image| AnthropicBlock::Image {
            source: AnthropicImageSource {
                source_type: "base64",
                media_type: image.mime_type.clone(),
                data: image.payload.clone(),
            },
        })
        .collect();
    content.push(AnthropicBlock::Text {
        text: message.content.clone(),
    });

    AnthropicMessage { role, content }
}

/// Decode Anthropic event payloads into text deltas
pub fn decode_stream<S>(events: S) -> DeltaStream
where
    S: Stream<Item = Result<String>> + Send + 'static,
{
    Box::pin(async_stream::try_stream! {
        futures::pin_mut!(events);

        while let Some(payload) = events.next().await {
            let payload = payload?;
            let event: AnthropicEvent = match serde_json::from_str(&payload) {
                Ok(event) => event,
                Err(e) => {
                    tracing::debug!("Skipping malformed Anthropic event: {}", e);
                    continue;
                }
            };

            match event {
                AnthropicEvent::ContentBlockDelta { delta } => {
                    if let Some(text) = delta.text.filter(|t| !t.is_empty()) {
                        yield text;
                    }
                }
                AnthropicEvent::Error { error } => {
                    Err(ParleyError::Provider(format!(
                        "{}: {}",
                        error.error_type, error.message
                    )))?;
                }
                AnthropicEvent::Other => {}
            }
        }
    })
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    async fn stream_chat(&self, request: &ChatRequest) -> Result<DeltaStream> {
        let url = format!("{}/v1/messages", self.api_base);
        let body = Self::convert_request(request);

        tracing::debug!(
            "Sending anthropic request: model={}, {} messages",
            body.model,
            body.messages.len()
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(ParleyError::Http)?;
        let response = ensure_success(ProviderKind::Anthropic, response).await?;

        Ok(decode_stream(sse_data(response.bytes_stream())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Attachment;
    use crate::providers::classify::{error_kind, ErrorKind};

    fn events(payloads: &[&str]) -> impl Stream<Item = Result<String>> + Send + 'static {
        let items: Vec<Result<String>> = payloads.iter().map(|p| Ok(p.to_string())).collect();
        futures::stream::iter(items)
    }

    #[tokio::test]
    async fn test_only_content_block_deltas_contribute() {
        let out: Vec<String> = decode_stream(events(&[
            r#"{"type":"message_start","message":{"id":"msg_1"}}"#,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi "}}"#,
            r#"{"type":"ping"}"#,
            "garbage",
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"there"}}"#,
            r#"{"type":"message_stop"}"#,
        ]))
        .map(|d| d.unwrap())
        .collect()
        .await;
        assert_eq!(out, vec!["Hi ".to_string(), "there".to_string()]);
    }

    #[tokio::test]
    async fn test_error_event_is_classified() {
        let results: Vec<Result<String>> = decode_stream(events(&[
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"A"}}"#,
            r#"{"type":"error","error":{"type":"rate_limit_error","message":"Slow down"}}"#,
        ]))
        .collect()
        .await;
        assert_eq!(results.len(), 2);
        let err = results[1].as_ref().unwrap_err();
        assert_eq!(error_kind(err), ErrorKind::Quota);
    }

    #[test]
    fn test_convert_request() {
        let message = Message::user("describe")
            .with_attachments(vec![Attachment::binary("a.jpg", "image/jpeg", b"jpg")]);
        let request = ChatRequest {
            model: "claude".into(),
            system_prompt: "sys".into(),
            messages: vec![message],
            temperature: 0.2,
            max_output_tokens: 64,
        };
        let json = serde_json::to_value(AnthropicProvider::convert_request(&request)).unwrap();
        assert_eq!(json["system"], "sys");
        assert_eq!(json["max_tokens"], 64);
        let content = json["messages"][0]["content"].as_array().unwrap();
        assert_eq!(content[0]["type"], "image");
        assert_eq!(content[0]["source"]["type"], "base64");
        assert_eq!(content[0]["source"]["media_type"], "image/jpeg");
        assert_eq!(content[1]["type"], "text");
        assert_eq!(content[1]["text"], "describe");
    }
}
