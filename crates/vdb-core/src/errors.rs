use std::fmt;

use crate::domain::Platform;

/// Why an extractor call failed, as far as the user is concerned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchFailureKind {
    AuthRequired,
    Unavailable,
    Private,
    AgeRestricted,
    Generic,
}

/// Typed downloader failure: a discriminant plus the human-readable cause.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchFailure {
    pub kind: FetchFailureKind,
    pub message: String,
}

impl FetchFailure {
    pub fn new(kind: FetchFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(FetchFailureKind::Generic, message)
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Reason a live session went away.
///
/// `status_code` follows the HTTP-ish numbering used by messaging backends
/// (401 logged out, 408 connection lost, ...). Adapters map their own errors
/// into it so the reconnect policy can stay backend-agnostic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisconnectReason {
    pub status_code: Option<u16>,
    pub message: String,
}

impl DisconnectReason {
    pub fn new(status_code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "{} (status {code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Core error type.
///
/// Adapter crates map their specific errors into this type so the pipeline can
/// report failures consistently and the session manager can pick a reconnect
/// strategy.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),

    #[error("invalid url")]
    InvalidUrl,

    #[error("platform mismatch: expected {expected}, detected {detected:?}")]
    PlatformMismatch {
        expected: Platform,
        detected: Option<Platform>,
    },

    #[error("metadata fetch failed: {0}")]
    MetadataFetchFailed(FetchFailure),

    #[error("media fetch failed: {0}")]
    MediaFetchFailed(FetchFailure),

    #[error("compression failed: {0}")]
    CompressionFailed(String),

    #[error("delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("session credentials invalid: {0}")]
    SessionAuthInvalid(String),

    #[error("session transport dropped: {0}")]
    SessionTransportDropped(DisconnectReason),
}

impl Error {
    /// Cause rendered into the single user-facing error reply.
    pub fn user_message(&self) -> String {
        match self {
            Error::InvalidUrl => "Invalid URL. Please provide a valid video link.".to_string(),
            Error::PlatformMismatch { detected, .. } => format!(
                "Invalid platform. This URL appears to be from {}",
                detected
                    .map(|p| p.as_str().to_string())
                    .unwrap_or_else(|| "an unsupported platform".to_string())
            ),
            Error::MetadataFetchFailed(f) | Error::MediaFetchFailed(f) => f.message.clone(),
            Error::CompressionFailed(s) => format!("Compression failed: {s}"),
            Error::DeliveryFailed(s) => format!("Failed to send the video: {s}"),
            other => other.to_string(),
        }
    }

    /// The wrapped message without the variant prefix.
    pub fn detail(&self) -> String {
        match self {
            Error::Config(s)
            | Error::External(s)
            | Error::CompressionFailed(s)
            | Error::DeliveryFailed(s)
            | Error::SessionAuthInvalid(s) => s.clone(),
            Error::Io(e) => e.to_string(),
            Error::Json(e) => e.to_string(),
            Error::MetadataFetchFailed(f) | Error::MediaFetchFailed(f) => f.message.clone(),
            Error::SessionTransportDropped(r) => r.to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
