//! # Channel Emitter
//!
//! Ordered per-channel handler lists, the delivery core of
//! [`MemoryTransport`](crate::memory::MemoryTransport).
//!
//! Handlers run with no lock held, so a callback may freely subscribe,
//! unsubscribe or emit. Once-slots are taken out of the list before the
//! delivery snapshot runs. Removed handlers are dropped after the lock is
//! released.

use crate::transport::{HandlerId, IpcEvent, TransportHandler};
use parking_lot::Mutex;
use std::collections::HashMap;

struct Slot {
    handler: TransportHandler,
    once: bool,
}

/// Per-channel subscription lists.
#[derive(Default)]
pub struct ChannelEmitter {
    channels: Mutex<HashMap<String, Vec<Slot>>>,
}

impl ChannelEmitter {
    /// Create an emitter with no subscriptions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a persistent handler.
    pub fn on(&self, channel: &str, handler: TransportHandler) {
        self.push(channel, handler, false);
    }

    /// Append a handler that fires at most once.
    pub fn once(&self, channel: &str, handler: TransportHandler) {
        self.push(channel, handler, true);
    }

    fn push(&self, channel: &str, handler: TransportHandler, once: bool) {
        self.channels
            .lock()
            .entry(channel.to_owned())
            .or_default()
            .push(Slot { handler, once });
    }

    /// Remove one handler. Unknown handlers are ignored.
    pub fn remove(&self, channel: &str, id: HandlerId) -> bool {
        let removed = {
            let mut channels = self.channels.lock();
            let Some(slots) = channels.get_mut(channel) else {
                return false;
            };
            let removed = slots
                .iter()
                .position(|slot| slot.handler.id() == id)
                .map(|index| slots.remove(index));
            if slots.is_empty() {
                channels.remove(channel);
            }
            removed
        };
        removed.is_some()
    }

    /// Remove all handlers on `channel`, or everywhere. Returns how many went.
    pub fn remove_all(&self, channel: Option<&str>) -> usize {
        let removed: Vec<Slot> = {
            let mut channels = self.channels.lock();
            match channel {
                Some(channel) => channels.remove(channel).unwrap_or_default(),
                None => channels.drain().flat_map(|(_, slots)| slots).collect(),
            }
        };
        removed.len()
    }

    /// Channels with at least one handler.
    #[must_use]
    pub fn channel_names(&self) -> Vec<String> {
        self.channels.lock().keys().cloned().collect()
    }

    /// Number of handlers on `channel`.
    #[must_use]
    pub fn listener_count(&self, channel: &str) -> usize {
        self.channels.lock().get(channel).map_or(0, Vec::len)
    }

    /// Deliver `message` to every handler on `channel`, in order.
    ///
    /// Returns the number of handlers invoked.
    pub fn emit(&self, channel: &str, event: &IpcEvent, message: &str) -> usize {
        let snapshot: Vec<TransportHandler> = {
            let mut channels = self.channels.lock();
            let Some(slots) = channels.get_mut(channel) else {
                return 0;
            };
            let snapshot: Vec<TransportHandler> =
                slots.iter().map(|slot| slot.handler.clone()).collect();
            slots.retain(|slot| !slot.once);
            if slots.is_empty() {
                channels.remove(channel);
            }
            snapshot
        };

        for handler in &snapshot {
            handler.call(event, message);
        }
        snapshot.len()
    }
}
