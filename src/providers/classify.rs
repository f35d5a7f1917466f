//! Provider failure classification
//!
//! Every error raised while talking to a provider is mapped onto one
//! [`ErrorKind`] through [`CLASSIFICATION_TABLE`] so callers get the same
//! actionable messages whichever vendor failed.

use crate::error::ParleyError;
use crate::providers::ProviderKind;
use std::time::Duration;

/// Category of a provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Request or first-byte timeout
    Timeout,
    /// Rate limit or quota exhaustion
    Quota,
    /// Rejected credentials
    Auth,
    /// Malformed request
    InvalidRequest,
    /// Connection failure
    Transport,
    /// Unparseable response shape
    Protocol,
    /// Outgoing message rejected locally
    Validation,
    /// Missing or invalid configuration
    Config,
    /// Local persistence failure
    Storage,
    /// Anything else
    Provider,
}

impl ErrorKind {
    /// Stable lowercase label for events and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Quota => "quota",
            Self::Auth => "auth",
            Self::InvalidRequest => "invalid_request",
            Self::Transport => "transport",
            Self::Protocol => "protocol",
            Self::Validation => "validation",
            Self::Config => "config",
            Self::Storage => "storage",
            Self::Provider => "provider",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error-text markers, checked in order, case-insensitively
pub const CLASSIFICATION_TABLE: &[(ErrorKind, &[&str])] = &[
    (
        ErrorKind::Quota,
        &["429", "resource_exhausted", "rate_limit", "quota"],
    ),
    (
        ErrorKind::Auth,
        &[
            "401",
            "403",
            "invalid_api_key",
            "api_key_invalid",
            "authentication_error",
            "permission_denied",
        ],
    ),
    (
        ErrorKind::InvalidRequest,
        &["400", "invalid_request_error", "invalid_argument"],
    ),
];

/// Looks `text` up in [`CLASSIFICATION_TABLE`]
///
/// # Examples
///
/// ```
/// use parley::providers::classify::{classify_text, ErrorKind};
///
/// assert_eq!(classify_text("HTTP 429 Too Many Requests"), Some(ErrorKind::Quota));
/// assert_eq!(classify_text("status: RESOURCE_EXHAUSTED"), Some(ErrorKind::Quota));
/// assert_eq!(classify_text("something odd"), None);
/// ```
pub fn classify_text(text: &str) -> Option<ErrorKind> {
    let lowered = text.to_lowercase();
    CLASSIFICATION_TABLE
        .iter()
        .find(|(_, markers)| markers.iter().any(|m| lowered.contains(m)))
        .map(|(kind, _)| *kind)
}

/// Kind of an already-built error
pub fn error_kind(error: &anyhow::Error) -> ErrorKind {
    if error.downcast_ref::<tokio::time::error::Elapsed>().is_some() {
        return ErrorKind::Timeout;
    }
    if let Some(e) = error.downcast_ref::<reqwest::Error>() {
        return reqwest_kind(e, &format!("{:#}", error));
    }

    match error.downcast_ref::<ParleyError>() {
        Some(ParleyError::Timeout(_)) => ErrorKind::Timeout,
        Some(ParleyError::Quota { .. }) => ErrorKind::Quota,
        Some(ParleyError::Authentication { .. }) => ErrorKind::Auth,
        Some(ParleyError::InvalidRequest { .. }) => ErrorKind::InvalidRequest,
        Some(ParleyError::Validation(_)) => ErrorKind::Validation,
        Some(ParleyError::Config(_)) | Some(ParleyError::MissingCredentials(_)) => {
            ErrorKind::Config
        }
        Some(ParleyError::Storage(_)) | Some(ParleyError::Io(_)) => ErrorKind::Storage,
        Some(ParleyError::Http(e)) => reqwest_kind(e, &format!("{:#}", error)),
        // Connection messages carry URLs whose port numbers would match
        // status markers
        Some(ParleyError::Transport(_)) => ErrorKind::Transport,
        other => {
            if let Some(kind) = classify_text(&format!("{:#}", error)) {
                return kind;
            }
            match other {
                Some(ParleyError::Protocol(_)) | Some(ParleyError::Serialization(_)) => {
                    ErrorKind::Protocol
                }
                _ => ErrorKind::Provider,
            }
        }
    }
}

fn reqwest_kind(e: &reqwest::Error, text: &str) -> ErrorKind {
    if e.is_timeout() {
        ErrorKind::Timeout
    } else if e.is_connect() || e.is_request() || e.is_body() {
        ErrorKind::Transport
    } else if let Some(kind) = classify_text(text) {
        kind
    } else if e.is_decode() {
        ErrorKind::Protocol
    } else {
        ErrorKind::Provider
    }
}

/// Rebuilds a provider failure as the typed error of its [`ErrorKind`]
///
/// Errors that are already classified pass through unchanged.
pub fn classify_error(
    provider: ProviderKind,
    timeout: Duration,
    error: anyhow::Error,
) -> anyhow::Error {
    let kind = error_kind(&error);
    let message = format!("{:#}", error);
    let provider = provider.to_string();

    match kind {
        ErrorKind::Timeout => ParleyError::Timeout(timeout).into(),
        ErrorKind::Quota if !is_typed(&error) => ParleyError::Quota { provider, message }.into(),
        ErrorKind::Auth if !is_typed(&error) => {
            ParleyError::Authentication { provider, message }.into()
        }
        ErrorKind::InvalidRequest if !is_typed(&error) => {
            ParleyError::InvalidRequest { provider, message }.into()
        }
        ErrorKind::Transport if !is_typed(&error) => ParleyError::Transport(message).into(),
        ErrorKind::Protocol if !is_typed(&error) => ParleyError::Protocol(message).into(),
        ErrorKind::Provider if !is_typed(&error) => {
            ParleyError::Provider(format!("{}: {}", provider, message)).into()
        }
        _ => error,
    }
}

/// Whether the error already carries the variant matching its kind
fn is_typed(error: &anyhow::Error) -> bool {
    let kind = error_kind(error);
    matches!(
        (error.downcast_ref::<ParleyError>(), kind),
        (Some(ParleyError::Quota { .. }), ErrorKind::Quota)
            | (Some(ParleyError::Authentication { .. }), ErrorKind::Auth)
            | (Some(ParleyError::InvalidRequest { .. }), ErrorKind::InvalidRequest)
            | (Some(ParleyError::Transport(_)), ErrorKind::Transport)
            | (Some(ParleyError::Protocol(_)), ErrorKind::Protocol)
            | (Some(ParleyError::Provider(_)), ErrorKind::Provider)
    )
}
