//! # In-Memory Transport
//!
//! Reference [`Transport`] for endpoints living in one process. A
//! [`MemoryHub`] owns one [`ChannelEmitter`] per attached peer; sending
//! delivers synchronously into the target peer's emitter, which gives the
//! reliable, per-channel ordered delivery the agent expects.
//!
//! ```text
//!  ┌──────────────┐   send(#1, ch)   ┌──────────────┐
//!  │  main  (#0)  │ ───────────────▶ │ window (#1)  │
//!  │   emitter    │ ◀─────────────── │   emitter    │
//!  └──────────────┘   send(#0, ch)   └──────────────┘
//! ```

use crate::emitter::ChannelEmitter;
use crate::envelope::WireMessage;
use crate::error::TransportError;
use crate::transport::{HandlerId, IpcEvent, PeerId, Transport, TransportHandler};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

type PeerTable = Arc<RwLock<HashMap<PeerId, Arc<ChannelEmitter>>>>;

/// Connects any number of in-process peers.
#[derive(Clone)]
pub struct MemoryHub {
    peers: PeerTable,
    next_peer: Arc<AtomicU32>,
}

impl MemoryHub {
    /// Create a hub with no peers attached.
    #[must_use]
    pub fn new() -> Self {
        Self {
            peers: Arc::new(RwLock::new(HashMap::new())),
            next_peer: Arc::new(AtomicU32::new(PeerId::MAIN.get() + 1)),
        }
    }

    /// Attach (or re-open) the main peer.
    #[must_use]
    pub fn main(&self) -> MemoryTransport {
        self.attach(PeerId::MAIN)
    }

    /// Attach a new peer under a freshly allocated address.
    #[must_use]
    pub fn connect(&self) -> MemoryTransport {
        let peer = PeerId::new(self.next_peer.fetch_add(1, Ordering::Relaxed));
        self.attach(peer)
    }

    /// Attach `peer`. Re-attaching an existing address shares its emitter.
    #[must_use]
    pub fn attach(&self, peer: PeerId) -> MemoryTransport {
        let inbound = self
            .peers
            .write()
            .entry(peer)
            .or_insert_with(|| Arc::new(ChannelEmitter::new()))
            .clone();
        debug!(peer = %peer, "Peer attached");
        MemoryTransport {
            local: peer,
            inbound,
            peers: self.peers.clone(),
        }
    }

    /// Detach `peer`; later sends to or from it fail.
    pub fn detach(&self, peer: PeerId) -> bool {
        let removed = self.peers.write().remove(&peer);
        if let Some(emitter) = &removed {
            emitter.remove_all(None);
            debug!(peer = %peer, "Peer detached");
        }
        removed.is_some()
    }

    /// Currently attached peers.
    #[must_use]
    pub fn peer_ids(&self) -> Vec<PeerId> {
        let mut ids: Vec<PeerId> = self.peers.read().keys().copied().collect();
        ids.sort();
        ids
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

/// One peer's view of a [`MemoryHub`].
pub struct MemoryTransport {
    local: PeerId,
    inbound: Arc<ChannelEmitter>,
    peers: PeerTable,
}

impl MemoryTransport {
    /// Address of this peer.
    #[must_use]
    pub fn peer_id(&self) -> PeerId {
        self.local
    }

    fn is_attached(&self) -> bool {
        self.peers
            .read()
            .get(&self.local)
            .is_some_and(|emitter| Arc::ptr_eq(emitter, &self.inbound))
    }
}

impl Transport for MemoryTransport {
    fn subscribe(&self, channel: &str, handler: TransportHandler) {
        self.inbound.on(channel, handler);
    }

    fn subscribe_once(&self, channel: &str, handler: TransportHandler) {
        self.inbound.once(channel, handler);
    }

    fn unsubscribe(&self, channel: &str, handler: HandlerId) -> bool {
        self.inbound.remove(channel, handler)
    }

    fn unsubscribe_all(&self, channel: Option<&str>) {
        self.inbound.remove_all(channel);
    }

    fn send(
        &self,
        target: PeerId,
        channel: &str,
        message: WireMessage,
    ) -> Result<(), TransportError> {
        if !self.is_attached() {
            return Err(TransportError::Disconnected);
        }
        let Some(emitter) = self.peers.read().get(&target).cloned() else {
            warn!(from = %self.local, to = %target, channel, "Send to unknown peer");
            return Err(TransportError::UnknownPeer(target));
        };

        let event = IpcEvent { sender: self.local };
        let delivered = emitter.emit(channel, &event, &message);
        debug!(
            from = %self.local,
            to = %target,
            channel,
            handlers = delivered,
            "Message delivered"
        );
        Ok(())
    }

    fn channel_names(&self) -> Vec<String> {
        self.inbound.channel_names()
    }

    fn listener_count(&self, channel: &str) -> usize {
        self.inbound.listener_count(channel)
    }
}
