//! # Endpoint Roles
//!
//! The only thing that differs between the two sides of a connection is
//! where outgoing messages go. A client always talks to the main peer; a
//! server answers whoever sent the request and otherwise talks to the one
//! peer it was bound to.

use crate::agent::Agent;
use crate::options::PartialOptions;
use crate::transport::{IpcEvent, PeerId, Transport};
use std::sync::Arc;

/// Addressing policy of an [`Agent`].
pub trait Endpoint: Send + Sync + 'static {
    /// Short role name used in log fields.
    fn role(&self) -> &'static str;

    /// Peer an outgoing message is addressed to. `origin` is the delivery
    /// being answered, if any.
    fn route(&self, origin: Option<&IpcEvent>) -> PeerId;
}

/// Renderer-side role: everything goes to the main peer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientRole;

impl Endpoint for ClientRole {
    fn role(&self) -> &'static str {
        "client"
    }

    fn route(&self, _origin: Option<&IpcEvent>) -> PeerId {
        PeerId::MAIN
    }
}

/// Main-side role bound to one peer.
#[derive(Debug, Clone, Copy)]
pub struct ServerRole {
    peer: PeerId,
}

impl ServerRole {
    /// Bind to `peer`.
    #[must_use]
    pub fn new(peer: PeerId) -> Self {
        Self { peer }
    }

    /// The bound peer.
    #[must_use]
    pub fn peer(&self) -> PeerId {
        self.peer
    }
}

impl Endpoint for ServerRole {
    fn role(&self) -> &'static str {
        "server"
    }

    fn route(&self, origin: Option<&IpcEvent>) -> PeerId {
        origin.map_or(self.peer, |event| event.sender)
    }
}

/// Agent talking to the main peer.
pub type Client = Agent<ClientRole>;

/// Agent bound to one peer, answering requests from any sender.
pub type Server = Agent<ServerRole>;

impl Agent<ClientRole> {
    /// Create a client over `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, defaults: PartialOptions) -> Self {
        Self::with_endpoint(ClientRole, transport, defaults)
    }
}

impl Agent<ServerRole> {
    /// Create a server over `transport`, bound to `peer`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, peer: PeerId, defaults: PartialOptions) -> Self {
        Self::with_endpoint(ServerRole::new(peer), transport, defaults)
    }

    /// The peer unsolicited messages are sent to.
    #[must_use]
    pub fn peer(&self) -> PeerId {
        self.endpoint().peer()
    }
}
