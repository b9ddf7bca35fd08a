//! Error types for the relay.
//!
//! Channel failures arrive from the Live API as opaque strings, so they are
//! classified by content into a [`FailureKind`] before being surfaced.

use thiserror::Error;

/// Result type alias for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("no credential available")]
    NoCredential,

    #[error("channel open failed: {0}")]
    ChannelOpen(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("link error: {0}")]
    Link(String),

    #[error("fragment decode failed: {0}")]
    Decode(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("session is not connected")]
    NotConnected,

    #[error("transcript store error: {0}")]
    Store(String),

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Session-level error for a classified channel failure.
    pub fn from_failure(kind: FailureKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            FailureKind::Quota => RelayError::QuotaExceeded(message),
            FailureKind::NotFound => RelayError::ResourceNotFound(message),
            FailureKind::Link => RelayError::Link(message),
        }
    }
}

impl From<cpal::DevicesError> for RelayError {
    fn from(err: cpal::DevicesError) -> Self {
        RelayError::AudioDevice(err.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for RelayError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        RelayError::AudioDevice(err.to_string())
    }
}

impl From<cpal::BuildStreamError> for RelayError {
    fn from(err: cpal::BuildStreamError) -> Self {
        RelayError::AudioDevice(err.to_string())
    }
}

impl From<cpal::PlayStreamError> for RelayError {
    fn from(err: cpal::PlayStreamError) -> Self {
        RelayError::AudioDevice(err.to_string())
    }
}

/// How a channel failure is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Rate limit or quota exhaustion: rotate the credential and reconnect.
    Quota,
    /// The model or endpoint does not exist. Fatal for the session.
    NotFound,
    /// Anything else.
    Link,
}

impl FailureKind {
    /// The single short status line shown for this failure.
    pub fn message(self) -> &'static str {
        match self {
            FailureKind::Quota => "Limit Reached. Rotating...",
            FailureKind::NotFound => "Model Link Failed (404)",
            FailureKind::Link => "Link Error.",
        }
    }
}

/// Classify a channel failure by its text.
///
/// This is a contract with the Live API's error surface. Matched substrings:
/// - quota: `"429"`, `"quota"` (any case), `"RESOURCE_EXHAUSTED"`
/// - not found: `"404"`, `"NOT_FOUND"`
///
/// Quota markers win when both appear.
pub fn classify(cause: &str) -> FailureKind {
    let lower = cause.to_ascii_lowercase();
    if cause.contains("429") || lower.contains("quota") || cause.contains("RESOURCE_EXHAUSTED") {
        FailureKind::Quota
    } else if cause.contains("404") || cause.contains("NOT_FOUND") {
        FailureKind::NotFound
    } else {
        FailureKind::Link
    }
}

/// Show only the tail of a credential.
pub fn mask_token(token: &str) -> String {
    let tail: String = token
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("…{}", tail)
}
