//! Common error types for the remote display.

use thiserror::Error;

/// Result type alias using the remote display error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for remote display operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No peer is connected to the signaling channel; the message was not delivered.
    #[error("signaling unavailable: no peer connected")]
    SignalingUnavailable,

    /// The relay already has two parties attached.
    #[error("signaling relay already has two parties")]
    RelayFull,

    /// The transport reported a failure while negotiating or connected.
    #[error("negotiation failed: {0}")]
    NegotiationFailed(String),

    /// No presentation session is active.
    #[error("no active presentation context")]
    NoPresentationContext,

    /// The presentation session has no reference space yet.
    #[error("no reference space")]
    NoReferenceSpace,

    /// A signaling payload could not be parsed.
    #[error("malformed signaling payload: {0}")]
    MalformedPayload(String),

    /// Peer transport error (description, candidate or media plumbing)
    #[error("transport error: {0}")]
    Transport(String),

    /// I/O error (sockets, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a negotiation failure from any displayable type.
    pub fn negotiation(msg: impl std::fmt::Display) -> Self {
        Self::NegotiationFailed(msg.to_string())
    }

    /// Create a malformed payload error from any displayable type.
    pub fn malformed(msg: impl std::fmt::Display) -> Self {
        Self::MalformedPayload(msg.to_string())
    }

    /// Create a transport error from any displayable type.
    pub fn transport(msg: impl std::fmt::Display) -> Self {
        Self::Transport(msg.to_string())
    }

    /// Create a serialization error from any displayable type.
    pub fn serialization(msg: impl std::fmt::Display) -> Self {
        Self::Serialization(msg.to_string())
    }

    /// Create a config error from any displayable type.
    pub fn config(msg: impl std::fmt::Display) -> Self {
        Self::Config(msg.to_string())
    }

    /// Whether the error only means a message went undelivered.
    pub fn is_non_fatal(&self) -> bool {
        matches!(self, Self::SignalingUnavailable | Self::MalformedPayload(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err)
    }
}
