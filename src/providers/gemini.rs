//! Google Gemini provider
//!
//! [`GeminiProvider::generate_stream`] yields whole
//! [`GenerateContentChunk`] objects from `streamGenerateContent?alt=sse`;
//! the [`Provider`] implementation reduces each one to its text.

use crate::config::GeminiConfig;
use crate::conversation::{Message, Role};
use crate::error::{ParleyError, Result};
use crate::providers::base::{ensure_success, ChatRequest, DeltaStream, Provider, ProviderKind};
use crate::providers::sse::sse_data;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Stream of decoded Gemini response chunks
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<GenerateContentChunk>> + Send>>;

/// Provider for the Gemini generateContent API
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: Client,
    api_base: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<GeminiInlineData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

/// One streamed `GenerateContentResponse`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentChunk {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
}

impl GenerateContentChunk {
    /// Concatenated text of the first candidate's parts
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

impl GeminiProvider {
    /// Create a new Gemini provider
    pub fn new(config: &GeminiConfig, api_key: String, timeout: Duration) -> Result<Self> {
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

        tracing::info!("Initialized Gemini provider: api_base={}", api_base);

        Ok(Self {
            client,
            api_base,
            api_key,
        })
    }

    fn convert_request(request: &ChatRequest) -> GeminiRequest {
        GeminiRequest {
            contents: request.messages.iter().map(convert_message).collect(),
            system_instruction: if request.system_prompt.is_empty() {
                None
            } else {
                Some(GeminiContent {
                    role: None,
                    parts: vec![GeminiPart {
                        text: Some(request.system_prompt.clone()),
                        inline_data: None,
                    }],
                })
            },
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
            },
        }
    }

    /// Send a streaming request and yield raw response chunks
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or Gemini answers with a
    /// non-success status. Individual chunks fail with
    /// [`ParleyError::Protocol`] when they cannot be decoded.
    pub async fn generate_stream(&self, request: &ChatRequest) -> Result<ChunkStream> {
        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.api_base, request.model
        );
        let body = Self::convert_request(request);

        tracing::debug!(
            "Sending gemini request: model={}, {} contents",
            request.model,
            body.contents.len()
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(ParleyError::Http)?;
        let response = ensure_success(ProviderKind::Gemini, response).await?;

        Ok(decode_chunks(sse_data(response.bytes_stream())))
    }
}

fn convert_message(message: &Message) -> GeminiContent {
    let role = match message.role {
        Role::User => "user",
        Role::Assistant => "model",
    };

    let mut parts = vec![GeminiPart {
        text: Some(message.content.clone()),
        inline_data: None,
    }];
    parts.extend(message.images().map(|image| GeminiPart {
        text: None,
        inline_data: Some(GeminiInlineData {
            mime_type: image.mime_type.clone(),
            data: image.payload.clone(),
        }),
    }));

    GeminiContent {
        role: Some(role.to_string()),
        parts,
    }
}

/// Decode Gemini event payloads into response chunks
pub fn decode_chunks<S>(events: S) -> ChunkStream
where
    S: Stream<Item = Result<String>> + Send + 'static,
{
    Box::pin(async_stream::try_stream! {
        futures::pin_mut!(events);

        while let Some(payload) = events.next().await {
            let payload = payload?;
            let chunk: GenerateContentChunk = serde_json::from_str(&payload).map_err(|e| {
                ParleyError::Protocol(format!("Failed to parse Gemini chunk: {}", e))
            })?;

            if let Some(error) = &chunk.error {
                Err(ParleyError::Provider(format!("Gemini stream error: {}", error)))?;
            }

            yield chunk;
        }
    })
}

#[async_trait]
impl Provider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    async fn stream_chat(&self, request: &ChatRequest) -> Result<DeltaStream> {
        let chunks = self.generate_stream(request).await?;
        Ok(Box::pin(chunks.filter_map(|chunk| async move {
            match chunk {
                Ok(chunk) => {
                    let text = chunk.text();
                    (!text.is_empty()).then_some(Ok(text))
                }
                Err(e) => Some(Err(e)),
            }
        })))
    }
}
