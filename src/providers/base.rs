//! Base provider trait and request types
//!
//! Every wire format is hidden behind [`Provider::stream_chat`], which
//! yields a [`DeltaStream`] of text fragments. Callers never see vendor
//! JSON.

use crate::conversation::Message;
use crate::error::{ParleyError, Result};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::str::FromStr;

/// Supported provider families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    /// OpenAI chat completions
    #[serde(rename = "openai")]
    OpenAi,
    /// Anthropic messages API
    #[serde(rename = "anthropic")]
    Anthropic,
    /// Google Gemini generateContent
    #[serde(rename = "gemini")]
    Gemini,
    /// Local Ollama through its OpenAI-compatible endpoint
    #[serde(rename = "ollama")]
    Ollama,
}

impl ProviderKind {
    /// All provider kinds
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::Gemini,
        ProviderKind::Ollama,
    ];

    /// Configuration and keyring name of the provider
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::Ollama => "ollama",
        }
    }

    /// Whether requests need an API key
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Self::Ollama)
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ParleyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            other => Err(ParleyError::Config(format!(
                "Unknown provider type: {}. Expected one of openai, anthropic, gemini, ollama",
                other
            ))),
        }
    }
}

/// Finite, non-restartable stream of text deltas from a provider
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Normalized request handed to a provider
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    /// Model identifier
    pub model: String,
    /// System instructions
    pub system_prompt: String,
    /// Ordered messages, oldest first, ending with the user turn
    pub messages: Vec<Message>,
    /// Sampling temperature
    pub temperature: f32,
    /// Output size cap
    pub max_output_tokens: u32,
}

/// AI provider trait
///
/// # Examples
///
/// ```
/// use parley::conversation::Message;
/// use parley::providers::{ChatRequest, DeltaStream, Provider, ProviderKind};
/// use parley::error::Result;
/// use async_trait::async_trait;
///
/// struct Echo;
///
/// #[async_trait]
/// impl Provider for Echo {
///     fn kind(&self) -> ProviderKind {
///         ProviderKind::Ollama
///     }
///
///     async fn stream_chat(&self, request: &ChatRequest) -> Result<DeltaStream> {
///         let text = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
///         Ok(Box::pin(futures::stream::iter(vec![Ok(text)])))
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let request = ChatRequest {
///     model: "echo".to_string(),
///     system_prompt: String::new(),
///     messages: vec![Message::user("ping")],
///     temperature: 0.0,
///     max_output_tokens: 16,
/// };
/// assert_eq!(Echo.complete(&request).await.unwrap(), "ping");
/// # });
/// ```
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider family, used for logging and error messages
    fn kind(&self) -> ProviderKind;

    /// Sends a streaming request
    ///
    /// Resolves once the response headers have been accepted; the returned
    /// stream then yields text deltas in arrival order.
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be sent or the provider answers
    /// with a non-success status
    async fn stream_chat(&self, request: &ChatRequest) -> Result<DeltaStream>;

    /// Sends a request and returns the full reply text
    ///
    /// The default implementation drains [`Provider::stream_chat`].
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let mut stream = self.stream_chat(request).await?;
        let mut text = String::new();
        while let Some(delta) = stream.next().await {
            text.push_str(&delta?);
        }
        Ok(text)
    }
}

/// Returns the response when its status is a success, otherwise reads the
/// body into a [`ParleyError::Api`]
pub(crate) async fn ensure_success(
    kind: ProviderKind,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::error!("{} returned error {}: {}", kind, status, body);
    Err(ParleyError::Api {
        provider: kind.to_string(),
        status: status.as_u16(),
        body,
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<&'static str>);

    #[async_trait]
    impl Provider for Fixed {
        fn kind(&self) -> ProviderKind {
            ProviderKind::OpenAi
        }

        async fn stream_chat(&self, _request: &ChatRequest) -> Result<DeltaStream> {
            let items: Vec<Result<String>> = self.0.iter().map(|s| Ok(s.to_string())).collect();
            Ok(Box::pin(futures::stream::iter(items)))
        }
    }

    fn request() -> ChatRequest {
        ChatRequest {
            model: "m".to_string(),
            system_prompt: String::new(),
            messages: vec![Message::user("hi")],
            temperature: 0.0,
            max_output_tokens: 16,
        }
    }

    #[test]
    fn test_provider_kind_parse_and_display() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.to_string().parse::<ProviderKind>().unwrap(), kind);
        }
        assert_eq!("  OpenAI ".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert!("copilot".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_provider_kind_serde_names() {
        let json = serde_json::to_string(&ProviderKind::OpenAi).unwrap();
        assert_eq!(json, "\"openai\"");
        let kind: ProviderKind = serde_json::from_str("\"gemini\"").unwrap();
        assert_eq!(kind, ProviderKind::Gemini);
    }

    #[test]
    fn test_requires_api_key() {
        assert!(ProviderKind::Anthropic.requires_api_key());
        assert!(!ProviderKind::Ollama.requires_api_key());
    }

    #[tokio::test]
    async fn test_default_complete_drains_stream() {
        let provider = Fixed(vec!["Hel", "lo", "!"]);
        assert_eq!(provider.complete(&request()).await.unwrap(), "Hello!");
    }
}
