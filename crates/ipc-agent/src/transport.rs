//! # Transport Contract
//!
//! The primitive the agent is layered on: fire-and-forget sends on named
//! channels plus per-channel subscriptions. The transport knows nothing
//! about requests, responses or listener lifetime.
//!
//! Removal is tolerant throughout: unsubscribing a handler the transport no
//! longer holds is a no-op that returns `false`.

use crate::envelope::WireMessage;
use crate::error::TransportError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Address of one endpoint attached to a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(u32);

impl PeerId {
    /// The single main-process peer every client talks to.
    pub const MAIN: PeerId = PeerId(0);

    /// Create a peer address.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Raw address.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Metadata accompanying one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpcEvent {
    /// Peer that sent the message.
    pub sender: PeerId,
}

/// Identity of one transport subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(Uuid);

impl HandlerId {
    /// Generate a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HandlerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type HandlerFn = dyn Fn(&IpcEvent, &str) + Send + Sync;

/// A callback subscribed to a channel, comparable by [`HandlerId`].
#[derive(Clone)]
pub struct TransportHandler {
    id: HandlerId,
    callback: Arc<HandlerFn>,
}

impl TransportHandler {
    /// Wrap a callback under a fresh id.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&IpcEvent, &str) + Send + Sync + 'static,
    {
        Self::with_id(HandlerId::new(), callback)
    }

    /// Wrap a callback under a known id.
    pub fn with_id<F>(id: HandlerId, callback: F) -> Self
    where
        F: Fn(&IpcEvent, &str) + Send + Sync + 'static,
    {
        Self {
            id,
            callback: Arc::new(callback),
        }
    }

    /// Subscription id.
    #[must_use]
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Invoke the callback.
    pub fn call(&self, event: &IpcEvent, message: &str) {
        (self.callback)(event, message);
    }
}

impl fmt::Debug for TransportHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportHandler")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Named-channel transport shared by two communicating endpoints.
///
/// Implementations deliver to handlers of one channel serially, in
/// registration order, and must remove a once-subscription before any later
/// delivery on that channel is dispatched.
pub trait Transport: Send + Sync {
    /// Subscribe a persistent handler.
    fn subscribe(&self, channel: &str, handler: TransportHandler);

    /// Subscribe a handler that is removed after its first delivery.
    fn subscribe_once(&self, channel: &str, handler: TransportHandler);

    /// Remove one handler. Returns `false` if it was not subscribed.
    fn unsubscribe(&self, channel: &str, handler: HandlerId) -> bool;

    /// Remove every handler on `channel`, or on every channel.
    fn unsubscribe_all(&self, channel: Option<&str>);

    /// Deliver `message` on `channel` to the peer at `target`.
    ///
    /// # Errors
    ///
    /// - `TransportError::UnknownPeer` - nothing is attached at `target`
    /// - `TransportError::Disconnected` - this endpoint was detached
    fn send(&self, target: PeerId, channel: &str, message: WireMessage)
        -> Result<(), TransportError>;

    /// Channels with at least one handler.
    fn channel_names(&self) -> Vec<String>;

    /// Number of handlers on `channel`.
    fn listener_count(&self, channel: &str) -> usize;
}
