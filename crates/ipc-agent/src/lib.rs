//! # IPC Agent - Request/Response over Named Channels
//!
//! Builds `post`/`respond` messaging on top of a transport that only knows
//! how to fire messages at named channels.
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────┐                          ┌──────────────┐
//! │    Client    │   {topic}-request        │    Server    │
//! │              │ ───────────────────────► │              │
//! │  post()      │                          │  on() / once │
//! │              │ ◄─────────────────────── │              │
//! └──────────────┘   {topic}-response       └──────────────┘
//!        │                                          │
//!        └──────────── Transport (send/subscribe) ──┘
//! ```
//!
//! - [`Envelope`] is the JSON wire form; absent data, `null` and error
//!   values all survive the trip.
//! - [`Agent`] is generic over an [`Endpoint`] that decides who a message
//!   is addressed to; [`Client`] and [`Server`] are the two roles.
//! - [`MemoryHub`] is an in-process transport for tests and embedding.
//!
//! ## Known limitation
//!
//! A listener that fails never answers, so the requester's future stays
//! pending. There are no timeouts in this crate.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod agent;
pub mod channels;
pub mod emitter;
pub mod endpoint;
pub mod envelope;
pub mod error;
pub mod future;
pub mod handler;
pub mod handler_map;
pub mod listener;
pub mod memory;
pub mod options;
pub mod transport;

// Re-export main types
pub use agent::Agent;
pub use channels::{Channels, CommunicationChannels};
pub use emitter::ChannelEmitter;
pub use endpoint::{Client, ClientRole, Endpoint, Server, ServerRole};
pub use envelope::{Envelope, Payload, RemoteError, WireMessage};
pub use error::{IpcError, IpcResult, TransportError};
pub use future::PayloadFuture;
pub use handler::{CancelSignal, Persistence, Registration};
pub use handler_map::HandlerMap;
pub use listener::{DeferredResponse, Listener, ListenerId, ResponseSource};
pub use memory::{MemoryHub, MemoryTransport};
pub use options::{ArgumentMode, Options, OptionsStore, PartialOptions, FALLBACK_OPTIONS};
pub use transport::{HandlerId, IpcEvent, PeerId, Transport, TransportHandler};
