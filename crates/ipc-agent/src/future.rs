//! # Pending Payloads
//!
//! [`PayloadFuture`] resolves with the next payload delivered on a channel.
//! It is backed by a one-shot subscription; if that subscription is removed
//! before anything arrives the future resolves with [`IpcError::Cancelled`]
//! instead of hanging.

use crate::envelope::Payload;
use crate::error::{IpcError, IpcResult};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Sending half held by the transport callback.
pub(crate) type PayloadSender = oneshot::Sender<IpcResult<Payload>>;

/// Future of the next payload on one channel.
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct PayloadFuture {
    channel: String,
    receiver: oneshot::Receiver<IpcResult<Payload>>,
}

impl PayloadFuture {
    /// Create a future for `channel` plus the sender that completes it.
    pub(crate) fn pending(channel: impl Into<String>) -> (PayloadSender, Self) {
        let (sender, receiver) = oneshot::channel();
        (
            sender,
            Self {
                channel: channel.into(),
                receiver,
            },
        )
    }

    /// Channel this future is waiting on.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl Future for PayloadFuture {
    type Output = IpcResult<Payload>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(IpcError::Cancelled)))
    }
}
