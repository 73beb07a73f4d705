//! Byte-stream transport between the two exchange peers.
//!
//! A [`Transport`] creates endpoints in one of two roles: a listening
//! endpoint bound to a channel name that accepts one peer, or a connected
//! endpoint dialed with a bounded timeout. Endpoints report link activity as
//! [`EndpointEvent`]s on the channel handed to them at creation.
//!
//! [`pipe::PipeTransport`] is the named-pipe implementation;
//! [`memory::MemoryTransport`] is an in-process pair used in tests.

pub mod frame;
pub mod memory;
pub mod pipe;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::Result;

/// Link activity reported by an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointEvent {
    /// A peer is attached and payloads can flow.
    Connected,
    /// One complete payload arrived from the peer.
    Data(Vec<u8>),
    /// The peer went away. Not emitted after a local [`Endpoint::close`].
    Disconnected,
}

/// Sender half an endpoint reports its events on.
pub type EventSender = mpsc::UnboundedSender<EndpointEvent>;

/// Receiver half the coordinator drains.
pub type EventReceiver = mpsc::UnboundedReceiver<EndpointEvent>;

/// Boxed future returned by [`Transport::connect`].
pub type ConnectFuture<'a> = Pin<Box<dyn Future<Output = Result<Arc<dyn Endpoint>>> + Send + 'a>>;

/// One side of an established or pending link.
pub trait Endpoint: Send + Sync {
    /// Queue one payload for the peer.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotConnected`](crate::AppError::NotConnected)
    /// without a live peer and
    /// [`AppError::Transport`](crate::AppError::Transport) if the payload
    /// cannot be framed or the link is broken.
    fn send(&self, payload: &[u8]) -> Result<()>;

    /// Tear the endpoint down. Idempotent.
    fn close(&self);

    /// Whether a peer is currently attached.
    fn is_connected(&self) -> bool;
}

/// Factory for listening and connecting endpoints.
pub trait Transport: Send + Sync + 'static {
    /// Bind `channel` and wait for one peer in the background.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`](crate::AppError::Transport) if the
    /// channel cannot be bound.
    fn listen(&self, channel: &str, events: EventSender) -> Result<Arc<dyn Endpoint>>;

    /// Dial `channel`, giving up after `timeout`.
    ///
    /// A successful connect emits [`EndpointEvent::Connected`] before the
    /// future resolves.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`](crate::AppError::Transport) on
    /// timeout or refusal.
    fn connect<'a>(
        &'a self,
        channel: &'a str,
        timeout: Duration,
        events: EventSender,
    ) -> ConnectFuture<'a>;
}
