//! Shared fixture: one server on the main peer and any number of clients,
//! all attached to the same [`MemoryHub`].

use ipc_agent::{Client, Listener, MemoryHub, PartialOptions, Payload, PeerId, Server};
use serde_json::json;
use std::sync::Arc;

/// A main-side server plus clients, each on its own peer.
pub struct Harness {
    pub hub: MemoryHub,
    pub server: Server,
    pub clients: Vec<Client>,
}

impl Harness {
    /// A server bound to the first of `clients` freshly connected peers.
    pub fn new(clients: usize) -> Self {
        let hub = MemoryHub::new();
        let transports: Vec<_> = (0..clients.max(1)).map(|_| hub.connect()).collect();
        let bound = transports
            .first()
            .map_or(PeerId::MAIN, |transport| transport.peer_id());
        let server = Server::new(Arc::new(hub.main()), bound, PartialOptions::new());
        let clients = transports
            .into_iter()
            .map(|transport| Client::new(Arc::new(transport), PartialOptions::new()))
            .collect();
        Self {
            hub,
            server,
            clients,
        }
    }

    /// The first client.
    pub fn client(&self) -> &Client {
        &self.clients[0]
    }
}

/// Answers `{n}` with `{n: n + 1}`.
pub fn increment() -> Listener {
    Listener::new(|data: Payload| {
        let n = data
            .as_value()
            .and_then(|value| value["n"].as_i64())
            .unwrap_or(0);
        json!({ "n": n + 1 })
    })
}

/// Answers with whatever it receives.
pub fn echo() -> Listener {
    Listener::new(|data: Payload| data)
}
