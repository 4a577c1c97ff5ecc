//! # Handler Registrations
//!
//! What the listener registry stores for each transport subscription.

use crate::transport::{HandlerId, TransportHandler};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// How long a registration lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Persistence {
    /// Fires on every delivery until removed.
    On,
    /// Removes itself on its first delivery.
    Once,
    /// Internal one-shot response wait. Never listed and never bulk-removed.
    Never,
}

impl Persistence {
    /// Whether registrations of this class are visible to the listener API.
    #[must_use]
    pub fn is_enumerable(self) -> bool {
        !matches!(self, Self::Never)
    }
}

impl fmt::Display for Persistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::On => "on",
            Self::Once => "once",
            Self::Never => "never",
        };
        f.write_str(name)
    }
}

/// Best-effort cancellation flag shared with in-flight listener work.
#[derive(Debug, Default)]
pub struct CancelSignal {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    /// A signal that has not fired.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Whether the signal has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the signal fires.
    pub async fn cancelled(&self) {
        let mut notified = std::pin::pin!(self.notify.notified());
        // Register interest before checking the flag so a concurrent cancel is not missed
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

/// One transport subscription tracked by the registry.
#[derive(Debug, Clone)]
pub struct Registration {
    handler: TransportHandler,
    persistence: Persistence,
    signal: Option<Arc<CancelSignal>>,
}

impl Registration {
    /// Track `handler` under `persistence`.
    #[must_use]
    pub fn new(handler: TransportHandler, persistence: Persistence) -> Self {
        Self {
            handler,
            persistence,
            signal: None,
        }
    }

    /// Attach a signal fired when the registration is purged.
    #[must_use]
    pub fn with_signal(mut self, signal: Arc<CancelSignal>) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Subscription id.
    #[must_use]
    pub fn id(&self) -> HandlerId {
        self.handler.id()
    }

    /// Persistence class.
    #[must_use]
    pub fn persistence(&self) -> Persistence {
        self.persistence
    }

    /// The subscribed handler.
    #[must_use]
    pub fn handler(&self) -> &TransportHandler {
        &self.handler
    }

    /// Fire the cancellation signal, if any.
    pub fn cancel(&self) {
        if let Some(signal) = &self.signal {
            signal.cancel();
        }
    }
}
