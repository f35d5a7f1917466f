//! Provider module for Parley
//!
//! This module contains the provider abstraction, the three streaming wire
//! formats, error classification, and the factory that maps a
//! [`ProviderKind`] to a concrete implementation.

pub mod anthropic;
pub mod base;
pub mod classify;
pub mod gemini;
pub mod openai;
pub mod sse;

pub use anthropic::AnthropicProvider;
pub use base::{ChatRequest, DeltaStream, Provider, ProviderKind};
pub use classify::{classify_error, error_kind, ErrorKind};
pub use gemini::{GeminiProvider, GenerateContentChunk};
pub use openai::OpenAiProvider;

use crate::config::ProviderConfig;
use crate::error::{ParleyError, Result};
use std::sync::Arc;
use std::time::Duration;

/// Keyring service under which API keys are stored
pub const KEYRING_SERVICE: &str = "parley";

/// Environment variable holding the API key of a provider
pub fn api_key_env_var(kind: ProviderKind) -> Option<&'static str> {
    match kind {
        ProviderKind::OpenAi => Some("OPENAI_API_KEY"),
        ProviderKind::Anthropic => Some("ANTHROPIC_API_KEY"),
        ProviderKind::Gemini => Some("GEMINI_API_KEY"),
        ProviderKind::Ollama => None,
    }
}

/// Resolve the API key of a provider
///
/// Lookup order: the configured key, the provider's environment variable,
/// then the system keyring.
///
/// # Errors
///
/// Returns `ParleyError::MissingCredentials` if no source has a key
pub fn resolve_api_key(kind: ProviderKind, configured: Option<&str>) -> Result<String> {
    if let Some(key) = configured.filter(|k| !k.trim().is_empty()) {
        return Ok(key.to_string());
    }

    if let Some(var) = api_key_env_var(kind) {
        if let Ok(key) = std::env::var(var) {
            if !key.trim().is_empty() {
                tracing::debug!("Using {} from environment", var);
                return Ok(key);
            }
        }
    }

    match keyring::Entry::new(KEYRING_SERVICE, kind.as_str()).and_then(|e| e.get_password()) {
        Ok(key) => {
            tracing::debug!("Using {} API key from keyring", kind);
            Ok(key)
        }
        Err(e) => {
            tracing::debug!("No {} API key in keyring: {}", kind, e);
            Err(ParleyError::MissingCredentials(kind.to_string()).into())
        }
    }
}

/// Store an API key in the system keyring
///
/// # Errors
///
/// Returns error if the keyring is unavailable
pub fn store_api_key(kind: ProviderKind, key: &str) -> Result<()> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, kind.as_str())?;
    entry.set_password(key)?;
    tracing::info!("Stored {} API key in keyring", kind);
    Ok(())
}

/// Create a provider instance for `kind`
///
/// `timeout` bounds connection establishment; request-level timeouts are
/// applied by [`crate::stream::StreamAdapter`].
///
/// # Errors
///
/// Returns error if credentials are missing or the HTTP client cannot be built
///
/// # Examples
///
/// ```
/// use parley::config::ProviderConfig;
/// use parley::providers::{create_provider, ProviderKind};
/// use std::time::Duration;
///
/// let provider = create_provider(ProviderKind::Ollama, &ProviderConfig::default(), Duration::from_secs(30));
/// assert_eq!(provider.unwrap().kind(), ProviderKind::Ollama);
/// ```
pub fn create_provider(
    kind: ProviderKind,
    config: &ProviderConfig,
    timeout: Duration,
) -> Result<Arc<dyn Provider>> {
    let provider: Arc<dyn Provider> = match kind {
        ProviderKind::OpenAi => {
            let key = resolve_api_key(kind, config.openai.api_key.as_deref())?;
            Arc::new(OpenAiProvider::new(&config.openai, key, timeout)?)
        }
        ProviderKind::Anthropic => {
            let key = resolve_api_key(kind, config.anthropic.api_key.as_deref())?;
            Arc::new(AnthropicProvider::new(&config.anthropic, key, timeout)?)
        }
        ProviderKind::Gemini => {
            let key = resolve_api_key(kind, config.gemini.api_key.as_deref())?;
            Arc::new(GeminiProvider::new(&config.gemini, key, timeout)?)
        }
        ProviderKind::Ollama => Arc::new(OpenAiProvider::ollama(&config.ollama, timeout)?),
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_configured_key_wins() {
        let key = resolve_api_key(ProviderKind::OpenAi, Some("sk-config")).unwrap();
        assert_eq!(key, "sk-config");
    }

    #[test]
    #[serial]
    fn test_env_key_used_when_unconfigured() {
        std::env::set_var("ANTHROPIC_API_KEY", "sk-env");
        let key = resolve_api_key(ProviderKind::Anthropic, Some("  "));
        std::env::remove_var("ANTHROPIC_API_KEY");
        assert_eq!(key.unwrap(), "sk-env");
    }

    #[test]
    fn test_env_var_names() {
        assert_eq!(api_key_env_var(ProviderKind::Gemini), Some("GEMINI_API_KEY"));
        assert_eq!(api_key_env_var(ProviderKind::Ollama), None);
    }

    #[test]
    fn test_create_provider_with_configured_keys() {
        let mut config = ProviderConfig::default();
        config.openai.api_key = Some("a".into());
        config.anthropic.api_key = Some("b".into());
        config.gemini.api_key = Some("c".into());
        for kind in ProviderKind::ALL {
            let provider = create_provider(kind, &config, Duration::from_secs(5)).unwrap();
            assert_eq!(provider.kind(), kind);
        }
    }
}
