//! Error types for Parley
//!
//! This module defines all error types used throughout the engine,
//! using `thiserror` for ergonomic error handling.

use std::time::Duration;
use thiserror::Error;

/// Main error type for Parley operations
///
/// Covers configuration, credential, transport, protocol and provider
/// failures, as well as validation of outgoing messages and storage.
/// Provider failures are classified into the `Quota`, `Authentication`,
/// `InvalidRequest`, `Timeout` and `Provider` variants by
/// [`crate::providers::classify`].
#[derive(Error, Debug)]
pub enum ParleyError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing credentials for provider
    #[error("Missing credentials for provider: {0}. Set the API key in config, the environment, or run `parley auth --provider {0}`")]
    MissingCredentials(String),

    /// Outgoing message rejected before any network call
    #[error("Validation error: {0}")]
    Validation(String),

    /// Network-level failure reaching the provider
    #[error("Transport error: {0}")]
    Transport(String),

    /// Provider did not answer within the request timeout
    #[error("Provider took too long to respond (timeout after {})", format_timeout(.0))]
    Timeout(Duration),

    /// Provider response did not match the expected schema
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Provider rejected the request for quota or rate-limit reasons
    #[error("Quota exceeded for {provider}: {message}. Wait a moment or check your plan and billing")]
    Quota {
        /// Provider that rejected the request
        provider: String,
        /// Raw provider message
        message: String,
    },

    /// Provider rejected the credentials
    #[error("Authentication failed for {provider}: {message}. Check the configured API key")]
    Authentication {
        /// Provider that rejected the credentials
        provider: String,
        /// Raw provider message
        message: String,
    },

    /// Provider considered the request malformed
    #[error("Invalid request to {provider}: {message}")]
    InvalidRequest {
        /// Provider that rejected the request
        provider: String,
        /// Raw provider message
        message: String,
    },

    /// Non-success HTTP status returned by a provider, before classification
    #[error("{provider} returned error {status}: {body}")]
    Api {
        /// Provider name
        provider: String,
        /// HTTP status code
        status: u16,
        /// Response body text
        body: String,
    },

    /// Generic provider error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Conversation storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Keyring/credential storage errors
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Renders a timeout in whole seconds, or milliseconds when below one second
fn format_timeout(timeout: &Duration) -> String {
    if timeout.as_secs() == 0 || timeout.subsec_millis() != 0 {
        format!("{}ms", timeout.as_millis())
    } else {
        format!("{}s", timeout.as_secs())
    }
}

/// Result type alias for Parley operations
///
/// Uses `anyhow::Error` as the error type so callers can attach context;
/// the underlying `ParleyError` is recovered with `downcast_ref`.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = ParleyError::Config("invalid format".to_string());
        assert_eq!(error.to_string(), "Configuration error: invalid format");
    }

    #[test]
    fn test_missing_credentials_mentions_auth_command() {
        let error = ParleyError::MissingCredentials("openai".to_string());
        let s = error.to_string();
        assert!(s.starts_with("Missing credentials for provider: openai"));
        assert!(s.contains("parley auth --provider openai"));
    }

    #[test]
    fn test_timeout_display() {
        let error = ParleyError::Timeout(Duration::from_secs(30));
        assert_eq!(
            error.to_string(),
            "Provider took too long to respond (timeout after 30s)"
        );
    }

    #[test]
    fn test_sub_second_timeout_display_uses_millis() {
        let error = ParleyError::Timeout(Duration::from_millis(200));
        assert_eq!(
            error.to_string(),
            "Provider took too long to respond (timeout after 200ms)"
        );

        let error = ParleyError::Timeout(Duration::from_millis(1500));
        assert!(error.to_string().ends_with("(timeout after 1500ms)"));
    }

    #[test]
    fn test_quota_display_is_actionable() {
        let error = ParleyError::Quota {
            provider: "gemini".to_string(),
            message: "RESOURCE_EXHAUSTED".to_string(),
        };
        let s = error.to_string();
        assert!(s.contains("gemini"));
        assert!(s.contains("RESOURCE_EXHAUSTED"));
        assert!(s.contains("billing"));
    }

    #[test]
    fn test_api_error_display() {
        let error = ParleyError::Api {
            provider: "anthropic".to_string(),
            status: 529,
            body: "overloaded".to_string(),
        };
        assert_eq!(error.to_string(), "anthropic returned error 529: overloaded");
    }

    #[test]
    fn test_validation_error_display() {
        let error = ParleyError::Validation("message is empty".to_string());
        assert_eq!(error.to_string(), "Validation error: message is empty");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: ParleyError = io_error.into();
        assert!(matches!(error, ParleyError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("{invalid json}").unwrap_err();
        let error: ParleyError = json_error.into();
        assert!(matches!(error, ParleyError::Serialization(_)));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>("invalid: : yaml").unwrap_err();
        let error: ParleyError = yaml_error.into();
        assert!(matches!(error, ParleyError::Yaml(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ParleyError>();
    }

    #[test]
    fn test_storage_error_display() {
        let error = ParleyError::Storage("flush failed".to_string());
        assert_eq!(error.to_string(), "Storage error: flush failed");
    }
}
