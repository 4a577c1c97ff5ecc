//! # Listeners
//!
//! A [`Listener`] is a cloneable handle around a user function. Its
//! [`ListenerId`] is the registry key, so a listener is removed with the
//! same handle (or any clone of it) it was registered with.

use crate::envelope::{Payload, RemoteError};
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

/// Identity shared by a listener and all of its clones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A response that resolves later. An `Err` means the listener failed.
pub type DeferredResponse = BoxFuture<'static, Result<Payload, RemoteError>>;

/// What a listener hands back for the requester.
pub enum ResponseSource {
    /// Send this payload right away.
    Immediate(Payload),
    /// Send the payload once the future resolves.
    Deferred(DeferredResponse),
}

impl ResponseSource {
    /// Respond with no data.
    #[must_use]
    pub fn none() -> Self {
        Self::Immediate(Payload::Absent)
    }

    /// Respond once `future` resolves.
    pub fn deferred<F, P>(future: F) -> Self
    where
        F: Future<Output = Result<P, RemoteError>> + Send + 'static,
        P: Into<Payload>,
    {
        Self::Deferred(future.map(|outcome| outcome.map(Into::into)).boxed())
    }
}

impl fmt::Debug for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate(payload) => f.debug_tuple("Immediate").field(payload).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl From<Payload> for ResponseSource {
    fn from(payload: Payload) -> Self {
        Self::Immediate(payload)
    }
}

impl From<Value> for ResponseSource {
    fn from(value: Value) -> Self {
        Self::Immediate(Payload::Value(value))
    }
}

impl From<Option<Value>> for ResponseSource {
    fn from(value: Option<Value>) -> Self {
        Self::Immediate(Payload::from(value))
    }
}

impl From<RemoteError> for ResponseSource {
    fn from(err: RemoteError) -> Self {
        Self::Immediate(Payload::Error(err))
    }
}

impl From<()> for ResponseSource {
    fn from((): ()) -> Self {
        Self::none()
    }
}

type ListenerFn = dyn Fn(Payload) -> ResponseSource + Send + Sync;

/// A request listener.
#[derive(Clone)]
pub struct Listener {
    id: ListenerId,
    func: Arc<ListenerFn>,
}

impl Listener {
    /// Wrap `func`. Its return value becomes the response.
    pub fn new<F, R>(func: F) -> Self
    where
        F: Fn(Payload) -> R + Send + Sync + 'static,
        R: Into<ResponseSource>,
    {
        Self {
            id: ListenerId::new(),
            func: Arc::new(move |data: Payload| -> ResponseSource { func(data).into() }),
        }
    }

    /// Registry key of this listener.
    #[must_use]
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Call the wrapped function.
    pub fn invoke(&self, data: Payload) -> ResponseSource {
        (self.func)(data)
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Listener {}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener").field("id", &self.id).finish_non_exhaustive()
    }
}
