//! # Dispatch Core
//!
//! [`Agent`] turns a fire-and-forget transport into request/response
//! messaging. Every topic maps onto a request channel and a response
//! channel (see [`Channels`]).
//!
//! ```text
//!   side A                                        side B
//!   post("ping", d) ──► ping-request ──────────► on("ping", f)
//!        │                                          │ f(d)
//!   PayloadFuture ◄──── ping-response ◄──────── response
//! ```
//!
//! A listener that panics, or whose deferred result resolves to `Err`,
//! sends nothing back: the requester's [`PayloadFuture`] stays pending.
//! Callers that need a bound wrap the future in `tokio::time::timeout`.
//! A listener result that cannot be encoded is answered with a
//! `SerializationError` instead.
//!
//! The envelope's `isResponse` flag and topic are checked on receipt.
//! Listeners ignore response envelopes, and response waits ignore requests
//! and envelopes for other topics; neither is used up by such traffic.

use crate::channels::Channels;
use crate::endpoint::Endpoint;
use crate::envelope::{Envelope, Payload, RemoteError};
use crate::error::{IpcError, IpcResult};
use crate::future::PayloadFuture;
use crate::handler::{CancelSignal, Persistence, Registration};
use crate::handler_map::HandlerMap;
use crate::listener::{Listener, ResponseSource};
use crate::options::{Options, OptionsStore, PartialOptions, FALLBACK_OPTIONS};
use crate::transport::{HandlerId, IpcEvent, Transport, TransportHandler};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

fn validate_topic(topic: &str) -> IpcResult<()> {
    if topic.is_empty() {
        return Err(IpcError::invalid_topic(topic, "topic is empty"));
    }
    Ok(())
}

/// What a subscription does with one delivery.
enum Receipt {
    Accept(IpcResult<Payload>),
    Ignore(Envelope),
}

/// Decode `message` for a subscription on `topic` that expects
/// `is_response` envelopes. Undecodable traffic is accepted as an error.
fn receive(message: &str, topic: &str, is_response: bool) -> Receipt {
    match Envelope::deserialize(message) {
        Ok(envelope) if envelope.is_response == is_response && envelope.channel == topic => {
            Receipt::Accept(Ok(envelope.data))
        }
        Ok(envelope) => Receipt::Ignore(envelope),
        Err(err) => Receipt::Accept(Err(err)),
    }
}

struct AgentInner<E: Endpoint> {
    endpoint: E,
    transport: Arc<dyn Transport>,
    options: OptionsStore,
    handlers: HandlerMap,
}

/// Request/response messaging over a [`Transport`].
///
/// Cloning is cheap; clones share listeners and options.
pub struct Agent<E: Endpoint> {
    inner: Arc<AgentInner<E>>,
}

impl<E: Endpoint> Clone for Agent<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E: Endpoint> Agent<E> {
    /// Create an agent with an explicit addressing policy.
    #[must_use]
    pub fn with_endpoint(
        endpoint: E,
        transport: Arc<dyn Transport>,
        defaults: PartialOptions,
    ) -> Self {
        Self {
            inner: Arc::new(AgentInner {
                endpoint,
                handlers: HandlerMap::new(transport.clone()),
                transport,
                options: OptionsStore::new(&FALLBACK_OPTIONS, defaults),
            }),
        }
    }

    /// The addressing policy.
    #[must_use]
    pub fn endpoint(&self) -> &E {
        &self.inner.endpoint
    }

    /// Role name, `"client"` or `"server"`.
    #[must_use]
    pub fn role(&self) -> &'static str {
        self.inner.endpoint.role()
    }

    /// Change this agent's default options.
    ///
    /// With `replace`, keys not set in `options` revert to the library
    /// fallback; otherwise `options` is merged over the current defaults.
    pub fn configure(&self, options: PartialOptions, replace: bool) {
        self.inner.options.configure(options, replace);
        debug!(role = self.role(), ?options, replace, "Options configured");
    }

    /// Options in effect for a call with `overrides`.
    #[must_use]
    pub fn options(&self, overrides: Option<&PartialOptions>) -> Options {
        self.inner.options.resolve(overrides)
    }

    /// Send a request and wait for the response.
    ///
    /// The returned future resolves with the first response envelope for
    /// `topic` on its response channel. There is no timeout.
    ///
    /// # Errors
    ///
    /// - `IpcError::InvalidTopic` - empty topic
    /// - `IpcError::MalformedError` / `IpcError::Serialization` - `data`
    ///   cannot be encoded
    /// - `IpcError::Transport` - the request could not be sent
    pub fn post(&self, topic: &str, data: impl Into<Payload>) -> IpcResult<PayloadFuture> {
        let channel = Channels::response_channel(topic);
        let (sender, future) = PayloadFuture::pending(channel);
        let sender = Mutex::new(Some(sender));
        self.await_response(topic, data.into(), move |result| {
            if let Some(sender) = sender.lock().take() {
                // The caller may have dropped the future
                let _ = sender.send(result);
            }
        })?;
        Ok(future)
    }

    /// Send a request and hand the response to `callback`.
    ///
    /// With `node_callbacks` enabled an error response arrives as
    /// `Err(IpcError::Remote)`; otherwise it arrives as `Ok(Payload::Error)`.
    /// A response that cannot be decoded is always an `Err`. The callback is
    /// never invoked if the peer does not answer. A panicking callback is
    /// logged and does not reach the responder.
    ///
    /// # Errors
    ///
    /// Same as [`Agent::post`].
    pub fn post_with_callback<F>(
        &self,
        topic: &str,
        data: impl Into<Payload>,
        callback: F,
    ) -> IpcResult<()>
    where
        F: FnOnce(IpcResult<Payload>) + Send + 'static,
    {
        let node_callbacks = self.options(None).node_callbacks;
        let callback = Mutex::new(Some(callback));
        let owned = topic.to_owned();
        self.await_response(topic, data.into(), move |result| {
            let Some(callback) = callback.lock().take() else {
                return;
            };
            let result = match result {
                Ok(Payload::Error(err)) if node_callbacks => Err(IpcError::Remote(err)),
                other => other,
            };
            // Runs on the responder's send path
            if catch_unwind(AssertUnwindSafe(|| callback(result))).is_err() {
                warn!(topic = %owned, "Response callback panicked");
            }
        })
    }

    fn await_response<F>(&self, topic: &str, data: Payload, deliver: F) -> IpcResult<()>
    where
        F: Fn(IpcResult<Payload>) + Send + Sync + 'static,
    {
        validate_topic(topic)?;
        let channels = Channels::communication_channels(topic);
        let message = Envelope::request(topic, data).serialize()?;

        // Wait first: an in-process peer may answer before send returns
        let role = self.role();
        let owned = topic.to_owned();
        let wait = self
            .inner
            .handlers
            .add_wait(&channels.response_channel, move |_event, message| {
                match receive(message, &owned, true) {
                    Receipt::Accept(result) => {
                        deliver(result);
                        true
                    }
                    Receipt::Ignore(envelope) => {
                        warn!(
                            role,
                            topic = %owned,
                            channel = %envelope.channel,
                            is_response = envelope.is_response,
                            "Ignoring envelope that does not answer this post"
                        );
                        false
                    }
                }
            });

        let target = self.inner.endpoint.route(None);
        if let Err(err) = self
            .inner
            .transport
            .send(target, &channels.request_channel, message)
        {
            self.inner.handlers.cancel_wait(&channels.response_channel, wait);
            warn!(role, topic, error = %err, "Request not sent");
            return Err(err.into());
        }
        debug!(role = self.role(), topic, to = %target, "Request posted");
        Ok(())
    }

    /// Send a response on `topic` without a matching request.
    ///
    /// # Errors
    ///
    /// - `IpcError::InvalidTopic` - empty topic
    /// - `IpcError::MalformedError` / `IpcError::Serialization` - `data`
    ///   cannot be encoded
    /// - `IpcError::Transport` - the response could not be sent
    pub fn respond(&self, topic: &str, data: impl Into<Payload>) -> IpcResult<()> {
        validate_topic(topic)?;
        self.inner.send_response(None, topic, data.into())
    }

    /// Send a request without waiting for a response.
    ///
    /// # Errors
    ///
    /// Same as [`Agent::respond`].
    pub fn request(&self, topic: &str, data: impl Into<Payload>) -> IpcResult<()> {
        validate_topic(topic)?;
        let message = Envelope::request(topic, data).serialize()?;
        let target = self.inner.endpoint.route(None);
        self.inner
            .transport
            .send(target, &Channels::request_channel(topic), message)?;
        debug!(role = self.role(), topic, to = %target, "Request sent");
        Ok(())
    }

    /// Answer every request on `topic` with `listener`.
    ///
    /// # Errors
    ///
    /// `IpcError::InvalidTopic` for an empty topic.
    pub fn on(
        &self,
        topic: &str,
        listener: &Listener,
        options: Option<PartialOptions>,
    ) -> IpcResult<()> {
        self.register(topic, listener, Persistence::On, options)
    }

    /// Answer the next request on `topic` with `listener`, then unregister.
    ///
    /// # Errors
    ///
    /// `IpcError::InvalidTopic` for an empty topic.
    pub fn once(
        &self,
        topic: &str,
        listener: &Listener,
        options: Option<PartialOptions>,
    ) -> IpcResult<()> {
        self.register(topic, listener, Persistence::Once, options)
    }

    fn register(
        &self,
        topic: &str,
        listener: &Listener,
        persistence: Persistence,
        overrides: Option<PartialOptions>,
    ) -> IpcResult<()> {
        validate_topic(topic)?;
        let channel = Channels::request_channel(topic);
        let options = self.options(overrides.as_ref());
        let signal = Arc::new(CancelSignal::new());
        let id = HandlerId::new();

        let invocation = Invocation {
            topic: topic.to_owned(),
            channel: channel.clone(),
            listener: listener.clone(),
            persistence,
            handler: id,
            options,
            signal: signal.clone(),
        };
        let agent = Arc::downgrade(&self.inner);
        let handler = TransportHandler::with_id(id, move |event, message| {
            if let Some(inner) = agent.upgrade() {
                inner.dispatch(&invocation, event, message);
            }
        });

        self.inner.handlers.add(
            &channel,
            listener.id(),
            Registration::new(handler, persistence).with_signal(signal),
        );
        debug!(
            role = self.role(),
            topic,
            listener = %listener.id(),
            %persistence,
            "Listener added"
        );
        Ok(())
    }

    /// Resolve with the data of the next request on `topic`. Nothing is
    /// sent back.
    ///
    /// The tap is not a listener: it is not counted by
    /// [`Agent::listener_count`] but is removed by
    /// [`Agent::remove_all_listeners`], which resolves it with
    /// `IpcError::Cancelled`.
    ///
    /// # Errors
    ///
    /// `IpcError::InvalidTopic` for an empty topic.
    pub fn capture(
        &self,
        topic: &str,
        options: Option<PartialOptions>,
    ) -> IpcResult<PayloadFuture> {
        validate_topic(topic)?;
        let channel = Channels::request_channel(topic);
        let arguments = self.options(options.as_ref()).arguments;
        let (sender, future) = PayloadFuture::pending(channel.clone());
        let sender = Mutex::new(Some(sender));
        let role = self.role();
        let owned = topic.to_owned();

        self.inner
            .handlers
            .subscribe_until(&channel, move |_event, message| {
                match receive(message, &owned, false) {
                    Receipt::Accept(result) => {
                        if let Some(sender) = sender.lock().take() {
                            let _ = sender.send(result.map(|data| arguments.present(data)));
                        }
                        true
                    }
                    Receipt::Ignore(envelope) => {
                        warn!(
                            role,
                            topic = %owned,
                            channel = %envelope.channel,
                            is_response = envelope.is_response,
                            "Capture ignoring envelope that is not a request for this topic"
                        );
                        false
                    }
                }
            });
        debug!(role, topic, "Capturing next request");
        Ok(future)
    }

    /// Remove every registration of `listener` on `topic`.
    ///
    /// Returns whether anything was registered. Deferred responses still in
    /// flight for the listener are dropped.
    ///
    /// # Errors
    ///
    /// `IpcError::InvalidTopic` for an empty topic.
    pub fn remove_listener(&self, topic: &str, listener: &Listener) -> IpcResult<bool> {
        validate_topic(topic)?;
        let removed = self
            .inner
            .handlers
            .purge(&Channels::request_channel(topic), Some(listener.id()));
        debug!(
            role = self.role(),
            topic,
            listener = %listener.id(),
            removed,
            "Listener removed"
        );
        Ok(removed)
    }

    /// Remove every listener on `topic`, or on every request channel when
    /// `topic` is `None`.
    ///
    /// Pending [`Agent::post`] waits are never affected.
    ///
    /// # Errors
    ///
    /// `IpcError::InvalidTopic` for an empty topic.
    pub fn remove_all_listeners(&self, topic: Option<&str>) -> IpcResult<bool> {
        let channels = match topic {
            Some(topic) => {
                validate_topic(topic)?;
                vec![Channels::request_channel(topic)]
            }
            None => {
                let mut channels: Vec<String> = self
                    .inner
                    .transport
                    .channel_names()
                    .into_iter()
                    .filter(|channel| Channels::is_request_channel(channel))
                    .collect();
                channels.extend(self.inner.handlers.channels());
                channels.sort();
                channels.dedup();
                channels
            }
        };

        let mut removed = false;
        for channel in &channels {
            removed |= self.inner.handlers.purge(channel, None);
        }
        debug!(role = self.role(), channels = channels.len(), removed, "Listeners removed");
        Ok(removed)
    }

    /// Number of listener registrations on `topic`.
    #[must_use]
    pub fn listener_count(&self, topic: &str) -> usize {
        self.inner
            .handlers
            .listener_count(&Channels::request_channel(topic))
    }

    /// Number of posts still waiting for a response.
    #[must_use]
    pub fn pending_responses(&self) -> usize {
        self.inner.handlers.pending_waits()
    }
}

/// Everything a listener's transport callback needs.
struct Invocation {
    topic: String,
    channel: String,
    listener: Listener,
    persistence: Persistence,
    handler: HandlerId,
    options: Options,
    signal: Arc<CancelSignal>,
}

impl<E: Endpoint> AgentInner<E> {
    fn dispatch(self: &Arc<Self>, invocation: &Invocation, event: &IpcEvent, message: &str) {
        let role = self.endpoint.role();
        let topic = invocation.topic.as_str();
        let data = match receive(message, topic, false) {
            Receipt::Accept(Ok(data)) => data,
            Receipt::Accept(Err(err)) => {
                warn!(role, topic, error = %err, "Dropping undecodable request");
                return;
            }
            Receipt::Ignore(envelope) => {
                warn!(
                    role,
                    topic,
                    channel = %envelope.channel,
                    is_response = envelope.is_response,
                    "Dropping envelope that is not a request for this topic"
                );
                return;
            }
        };

        if invocation.persistence == Persistence::Once {
            let taken = self.handlers.delete(
                &invocation.channel,
                invocation.listener.id(),
                Persistence::Once,
                invocation.handler,
            );
            if !taken {
                return;
            }
        }
        if invocation.signal.is_cancelled() {
            debug!(role, topic, "Listener removed before delivery");
            return;
        }

        let data = invocation.options.arguments.present(data);
        let listener = &invocation.listener;
        let source = match catch_unwind(AssertUnwindSafe(|| listener.invoke(data))) {
            Ok(source) => source,
            Err(_) => {
                warn!(
                    role,
                    topic,
                    listener = %listener.id(),
                    "Listener panicked; no response sent"
                );
                return;
            }
        };

        match source {
            ResponseSource::Immediate(payload) => self.reply(event, topic, payload),
            ResponseSource::Deferred(response) => {
                let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                    warn!(role, topic, "No async runtime; deferred response dropped");
                    return;
                };
                let agent = Arc::downgrade(self);
                let signal = invocation.signal.clone();
                let topic = topic.to_owned();
                let origin = *event;
                runtime.spawn(async move {
                    let outcome = tokio::select! {
                        biased;
                        () = signal.cancelled() => {
                            debug!(topic = %topic, "Listener removed; deferred response dropped");
                            return;
                        }
                        outcome = response => outcome,
                    };
                    match outcome {
                        Ok(payload) => {
                            if let Some(inner) = agent.upgrade() {
                                inner.reply(&origin, &topic, payload);
                            }
                        }
                        Err(err) => {
                            warn!(
                                topic = %topic,
                                error = %err,
                                "Listener failed; no response sent"
                            );
                        }
                    }
                });
            }
        }
    }

    /// Answer `origin`. A result that cannot be encoded is replaced by a
    /// `SerializationError`; other failures can only be logged here.
    fn reply(&self, origin: &IpcEvent, topic: &str, payload: Payload) {
        let role = self.endpoint.role();
        let err = match self.send_response(Some(origin), topic, payload) {
            Ok(()) => return,
            Err(err @ (IpcError::MalformedError { .. } | IpcError::Serialization(_))) => err,
            Err(err) => {
                warn!(role, topic, to = %origin.sender, error = %err, "Response not sent");
                return;
            }
        };

        warn!(role, topic, to = %origin.sender, error = %err, "Response not encodable");
        let fallback = RemoteError::new(RemoteError::SERIALIZATION_NAME, err.to_string());
        if let Err(err) = self.send_response(Some(origin), topic, fallback.into()) {
            warn!(role, topic, to = %origin.sender, error = %err, "Error response not sent");
        }
    }

    fn send_response(
        &self,
        origin: Option<&IpcEvent>,
        topic: &str,
        payload: Payload,
    ) -> IpcResult<()> {
        let message = Envelope::response(topic, payload).serialize()?;
        let target = self.endpoint.route(origin);
        self.transport
            .send(target, &Channels::response_channel(topic), message)?;
        debug!(role = self.endpoint.role(), topic, to = %target, "Response sent");
        Ok(())
    }
}
