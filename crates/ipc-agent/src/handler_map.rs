//! # Listener Registry
//!
//! Tracks every public subscription as
//! `channel -> listener -> persistence -> [registration]`, so a listener can
//! be removed from one channel, or a whole channel cleared, without relying
//! on the transport to remember who registered what.
//!
//! Internal response waits (`Persistence::Never`) live in a separate table
//! that no listing or bulk removal ever touches.
//!
//! `Once` registrations stay subscribed until their owner deletes them on a
//! delivery it accepts, so traffic the owner rejects does not use them up.
//! Waits and taps work the same way through [`HandlerMap::subscribe_until`].
//! Transport removal is tolerant, so removing a handler twice is a no-op.

use crate::handler::{Persistence, Registration};
use crate::listener::ListenerId;
use crate::transport::{HandlerId, IpcEvent, Transport, TransportHandler};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::debug;

type ByPersistence = HashMap<Persistence, Vec<Registration>>;
type ListenerTable = HashMap<ListenerId, ByPersistence>;
type WaitTable = Mutex<HashMap<HandlerId, String>>;

fn flatten(by_persistence: ByPersistence) -> Vec<Registration> {
    by_persistence.into_values().flatten().collect()
}

/// Removes a response wait from the wait table when it is satisfied or its
/// handler is dropped.
struct WaitTicket {
    waits: Weak<WaitTable>,
    id: HandlerId,
}

impl WaitTicket {
    fn release(&self) {
        if let Some(waits) = self.waits.upgrade() {
            waits.lock().remove(&self.id);
        }
    }
}

impl Drop for WaitTicket {
    fn drop(&mut self) {
        self.release();
    }
}

/// Registry of active listener subscriptions, linked to a transport.
pub struct HandlerMap {
    transport: Arc<dyn Transport>,
    map: Mutex<HashMap<String, ListenerTable>>,
    waits: Arc<WaitTable>,
}

impl HandlerMap {
    /// Create an empty registry over `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            map: Mutex::new(HashMap::new()),
            waits: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record `registration` and subscribe its handler on `channel`.
    ///
    /// The same listener may hold several registrations on one channel.
    /// Returns how many registrations of that persistence class the listener
    /// now has there. `Never` registrations are routed to
    /// [`HandlerMap::add_wait`] and are not recorded under the listener.
    pub fn add(&self, channel: &str, listener: ListenerId, registration: Registration) -> usize {
        let persistence = registration.persistence();
        if !persistence.is_enumerable() {
            let handler = registration.handler().clone();
            self.add_wait(channel, move |event, message| {
                handler.call(event, message);
                true
            });
            return 0;
        }

        let handler = registration.handler().clone();
        let mut map = self.map.lock();
        let registrations = map
            .entry(channel.to_owned())
            .or_default()
            .entry(listener)
            .or_default()
            .entry(persistence)
            .or_default();
        registrations.push(registration);
        let count = registrations.len();

        // Subscribed under the registry lock so a concurrent purge sees both or neither
        self.transport.subscribe(channel, handler);
        drop(map);

        debug!(channel, listener = %listener, persistence = %persistence, "Listener registered");
        count
    }

    /// Subscribe a response wait on `channel`.
    ///
    /// `accept` sees every delivery and returns `true` once it has taken the
    /// one it was waiting for. The wait is counted by
    /// [`HandlerMap::pending_waits`] until then, or until it is removed from
    /// the transport.
    pub fn add_wait<F>(&self, channel: &str, accept: F) -> HandlerId
    where
        F: Fn(&IpcEvent, &str) -> bool + Send + Sync + 'static,
    {
        let id = HandlerId::new();
        self.waits.lock().insert(id, channel.to_owned());

        let ticket = WaitTicket {
            waits: Arc::downgrade(&self.waits),
            id,
        };
        self.subscribe_matched(channel, id, move |event, message| {
            let accepted = accept(event, message);
            if accepted {
                ticket.release();
            }
            accepted
        });

        debug!(
            channel,
            handler = %id,
            persistence = %Persistence::Never,
            "Response wait registered"
        );
        id
    }

    /// Subscribe `accept` on `channel` until it returns `true`.
    ///
    /// Unlike a wait, the subscription is not tracked here; it is only
    /// reachable through the transport.
    pub fn subscribe_until<F>(&self, channel: &str, accept: F) -> HandlerId
    where
        F: Fn(&IpcEvent, &str) -> bool + Send + Sync + 'static,
    {
        let id = HandlerId::new();
        self.subscribe_matched(channel, id, accept);
        id
    }

    fn subscribe_matched<F>(&self, channel: &str, id: HandlerId, accept: F)
    where
        F: Fn(&IpcEvent, &str) -> bool + Send + Sync + 'static,
    {
        let transport = Arc::downgrade(&self.transport);
        let owned = channel.to_owned();
        let handler = TransportHandler::with_id(id, move |event, message| {
            if accept(event, message) {
                if let Some(transport) = transport.upgrade() {
                    transport.unsubscribe(&owned, id);
                }
            }
        });
        self.transport.subscribe(channel, handler);
    }

    /// Abandon a response wait.
    pub fn cancel_wait(&self, channel: &str, id: HandlerId) -> bool {
        let tracked = self.waits.lock().remove(&id).is_some();
        let subscribed = self.transport.unsubscribe(channel, id);
        tracked || subscribed
    }

    /// Remove the registrations of `listener` on `channel`, or every
    /// registration on `channel` when `listener` is `None`.
    ///
    /// Each removed registration is unsubscribed and its cancellation signal
    /// fired. Returns whether anything was registered.
    pub fn purge(&self, channel: &str, listener: Option<ListenerId>) -> bool {
        let removed: Vec<Registration> = {
            let mut map = self.map.lock();
            match listener {
                Some(listener) => {
                    let Some(listeners) = map.get_mut(channel) else {
                        return false;
                    };
                    let removed = listeners.remove(&listener).map(flatten).unwrap_or_default();
                    if listeners.is_empty() {
                        map.remove(channel);
                    }
                    for registration in &removed {
                        self.transport.unsubscribe(channel, registration.id());
                    }
                    removed
                }
                None => {
                    let removed = map
                        .remove(channel)
                        .map(|listeners| listeners.into_values().flat_map(flatten).collect())
                        .unwrap_or_default();
                    self.transport.unsubscribe_all(Some(channel));
                    removed
                }
            }
        };

        // Signals fire outside the lock; a cancellation hook may call back in
        for registration in &removed {
            registration.cancel();
        }
        debug!(channel, removed = removed.len(), "Listeners purged");
        !removed.is_empty()
    }

    /// Remove exactly one registration, as a once-handler does when it
    /// accepts a delivery.
    ///
    /// Does not fire the cancellation signal. Returns `false` when the
    /// registration is already gone (e.g. purged concurrently, or taken by a
    /// racing delivery) or is a `Never` wait.
    pub fn delete(
        &self,
        channel: &str,
        listener: ListenerId,
        persistence: Persistence,
        handler: HandlerId,
    ) -> bool {
        if !persistence.is_enumerable() {
            return false;
        }
        let removed = Self::take(&mut self.map.lock(), channel, listener, persistence, handler);
        self.transport.unsubscribe(channel, handler);
        removed.is_some()
    }

    fn take(
        map: &mut HashMap<String, ListenerTable>,
        channel: &str,
        listener: ListenerId,
        persistence: Persistence,
        handler: HandlerId,
    ) -> Option<Registration> {
        let listeners = map.get_mut(channel)?;
        let classes = listeners.get_mut(&listener)?;
        let registrations = classes.get_mut(&persistence)?;
        let index = registrations.iter().position(|r| r.id() == handler)?;
        let removed = registrations.remove(index);
        if registrations.is_empty() {
            classes.remove(&persistence);
        }
        if classes.is_empty() {
            listeners.remove(&listener);
        }
        if listeners.is_empty() {
            map.remove(channel);
        }
        Some(removed)
    }

    /// Purge every registration on every channel. Response waits survive.
    pub fn clear(&self) -> bool {
        let drained: Vec<(String, Registration)> = {
            let mut map = self.map.lock();
            map.drain()
                .flat_map(|(channel, listeners)| {
                    listeners
                        .into_values()
                        .flat_map(flatten)
                        .map(move |registration| (channel.clone(), registration))
                })
                .collect()
        };

        for (channel, registration) in &drained {
            self.transport.unsubscribe(channel, registration.id());
            registration.cancel();
        }
        debug!(removed = drained.len(), "Registry cleared");
        !drained.is_empty()
    }

    /// Whether `listener` has any registration on `channel`.
    #[must_use]
    pub fn contains(&self, channel: &str, listener: ListenerId) -> bool {
        self.map
            .lock()
            .get(channel)
            .is_some_and(|listeners| listeners.contains_key(&listener))
    }

    /// Number of registrations on `channel`.
    #[must_use]
    pub fn listener_count(&self, channel: &str) -> usize {
        self.map.lock().get(channel).map_or(0, |listeners| {
            listeners
                .values()
                .flat_map(HashMap::values)
                .map(Vec::len)
                .sum()
        })
    }

    /// Channels with at least one registration.
    #[must_use]
    pub fn channels(&self) -> Vec<String> {
        self.map.lock().keys().cloned().collect()
    }

    /// Total number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        let channels = self.channels();
        channels.iter().map(|channel| self.listener_count(channel)).sum()
    }

    /// Whether there are no registrations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }

    /// Number of outstanding response waits.
    #[must_use]
    pub fn pending_waits(&self) -> usize {
        self.waits.lock().len()
    }
}
