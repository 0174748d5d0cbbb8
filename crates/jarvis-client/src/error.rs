//! Error types for the Jarvis client.
//!
//! Transport errors describe a request that never produced a usable response.
//! Stream errors describe a failure while reading a response body after the
//! backend accepted the request. User-initiated cancellation is neither; the
//! pipeline reports it as a separate terminal outcome.

use thiserror::Error;

/// A result type using `TransportError`.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors returned by backend operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be sent or no response head arrived.
    #[error("HTTP error: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("API error ({status}): {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body text, empty if unavailable.
        body: String,
    },

    /// A successful response body could not be decoded.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// The cancellation token fired before the response head arrived.
    #[error("request cancelled")]
    Cancelled,
}

impl TransportError {
    /// HTTP status carried by the error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            Self::Parse(_) | Self::Cancelled => None,
        }
    }

    /// Returns true if this is a cancellation notice rather than a failure.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// A response body read failed after a successful initial status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("stream error: {0}")]
pub struct StreamError(pub String);

impl StreamError {
    /// Build a stream error from any displayable failure.
    pub fn new(detail: impl std::fmt::Display) -> Self {
        Self(detail.to_string())
    }

    /// Failure detail.
    #[must_use]
    pub fn detail(&self) -> &str {
        &self.0
    }
}
