//! # IPC Errors
//!
//! Error taxonomy for the request/response layer.
//!
//! "Nothing to remove" is never an error: removal paths return `bool`
//! instead. Errors are reserved for malformed input, payloads that cannot
//! be round-tripped, and transport failures.

use crate::envelope::RemoteError;
use crate::transport::PeerId;
use thiserror::Error;

/// Errors raised by the transport collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No peer with this address is attached to the transport.
    #[error("Unknown peer {0}")]
    UnknownPeer(PeerId),

    /// The transport has been shut down.
    #[error("Transport disconnected")]
    Disconnected,
}

/// Errors from agent operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IpcError {
    /// Topic names must be non-empty.
    #[error("Invalid topic {topic:?}: {reason}")]
    InvalidTopic { topic: String, reason: &'static str },

    /// A payload could not be encoded or decoded.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// An error-flagged payload is missing the fields needed to rebuild it.
    #[error("Malformed error payload on channel {channel}: {reason}")]
    MalformedError { channel: String, reason: String },

    /// The transport refused the message.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The peer answered with an error payload.
    #[error("Remote error: {0}")]
    Remote(RemoteError),

    /// The subscription backing a pending future was removed before it fired.
    #[error("Subscription cancelled before a message arrived")]
    Cancelled,
}

impl IpcError {
    /// Create an `InvalidTopic` error.
    pub fn invalid_topic(topic: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidTopic {
            topic: topic.into(),
            reason,
        }
    }

    /// Create a `MalformedError` error.
    pub fn malformed(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedError {
            channel: channel.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for IpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for agent operations.
pub type IpcResult<T> = Result<T, IpcError>;
