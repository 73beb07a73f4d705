//! In-process transport pair.
//!
//! Clones of one [`MemoryTransport`] share a hub keyed by channel name, so
//! two coordinators in the same process can link up exactly as they would
//! over a named pipe. Payloads are delivered synchronously into the peer's
//! event channel.
//!
//! The hub also records what happened: connect attempts, sends per side,
//! listener binds. Tests script failures with
//! [`MemoryTransport::fail_next_connects`] and
//! [`MemoryTransport::fail_next_listens`], and break links with
//! [`MemoryTransport::drop_link`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tracing::debug;

use crate::models::role::ExchangeRole;
use crate::transport::{ConnectFuture, Endpoint, EndpointEvent, EventSender, Transport};
use crate::{AppError, Result};

#[derive(Default)]
struct Hub {
    waiting: HashMap<String, Arc<MemoryEndpoint>>,
    links: HashMap<String, (Weak<MemoryEndpoint>, Weak<MemoryEndpoint>)>,
    failures_remaining: u32,
    listen_failures_remaining: u32,
    connect_attempts: u32,
    listen_attempts: HashMap<String, u32>,
    listen_count: HashMap<String, u32>,
    sends: HashMap<(String, ExchangeRole), u32>,
}

struct EndpointState {
    peer: Option<Weak<MemoryEndpoint>>,
    closed: bool,
}

struct MemoryEndpoint {
    channel: String,
    side: ExchangeRole,
    events: EventSender,
    state: Mutex<EndpointState>,
    hub: Weak<Mutex<Hub>>,
}

impl MemoryEndpoint {
    fn new(channel: &str, side: ExchangeRole, events: EventSender, hub: &Arc<Mutex<Hub>>) -> Self {
        Self {
            channel: channel.to_owned(),
            side,
            events,
            state: Mutex::new(EndpointState {
                peer: None,
                closed: false,
            }),
            hub: Arc::downgrade(hub),
        }
    }

    fn state(&self) -> MutexGuard<'_, EndpointState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn peer(&self) -> Option<Arc<MemoryEndpoint>> {
        let state = self.state();
        if state.closed {
            return None;
        }
        state.peer.as_ref().and_then(Weak::upgrade)
    }

    /// Detach from the peer and report the loss to the local owner.
    fn peer_lost(&self) {
        let mut state = self.state();
        if state.closed || state.peer.take().is_none() {
            return;
        }
        drop(state);
        let _ = self.events.send(EndpointEvent::Disconnected);
    }
}

impl Endpoint for MemoryEndpoint {
    fn send(&self, payload: &[u8]) -> Result<()> {
        if let Some(hub) = self.hub.upgrade() {
            let mut hub = lock_hub(&hub);
            *hub.sends.entry((self.channel.clone(), self.side)).or_default() += 1;
        }

        let peer = self.peer().ok_or_else(|| {
            AppError::NotConnected(format!("no peer on channel '{}'", self.channel))
        })?;
        peer.events
            .send(EndpointEvent::Data(payload.to_vec()))
            .map_err(|_| AppError::Transport(format!("peer on '{}' is gone", self.channel)))
    }

    fn close(&self) {
        if let Some(hub) = self.hub.upgrade() {
            let mut hub = lock_hub(&hub);
            let is_waiting = hub
                .waiting
                .get(&self.channel)
                .is_some_and(|waiting| std::ptr::eq(Arc::as_ptr(waiting), self));
            if is_waiting {
                hub.waiting.remove(&self.channel);
            }
        }

        let peer = {
            let mut state = self.state();
            if state.closed {
                return;
            }
            state.closed = true;
            state.peer.take().and_then(|peer| peer.upgrade())
        };

        if let Some(peer) = peer {
            debug!(channel = %self.channel, side = %self.side, "memory link closed locally");
            peer.peer_lost();
        }
    }

    fn is_connected(&self) -> bool {
        self.peer().is_some()
    }
}

fn lock_hub(hub: &Mutex<Hub>) -> MutexGuard<'_, Hub> {
    hub.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared in-memory channel namespace.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    hub: Arc<Mutex<Hub>>,
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hub = lock_hub(&self.hub);
        f.debug_struct("MemoryTransport")
            .field("waiting", &hub.waiting.len())
            .field("links", &hub.links.len())
            .field("connect_attempts", &hub.connect_attempts)
            .finish()
    }
}

impl MemoryTransport {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn hub(&self) -> MutexGuard<'_, Hub> {
        lock_hub(&self.hub)
    }

    /// Make the next `count` connect attempts fail as if refused.
    pub fn fail_next_connects(&self, count: u32) {
        self.hub().failures_remaining = count;
    }

    /// Make the next `count` listen calls fail as if the name were taken.
    pub fn fail_next_listens(&self, count: u32) {
        self.hub().listen_failures_remaining = count;
    }

    /// Total connect attempts seen by the hub.
    #[must_use]
    pub fn connect_attempts(&self) -> u32 {
        self.hub().connect_attempts
    }

    /// Listen calls made for `channel`, failed ones included.
    #[must_use]
    pub fn listen_attempts(&self, channel: &str) -> u32 {
        self.hub().listen_attempts.get(channel).copied().unwrap_or(0)
    }

    /// Times a listener was bound on `channel`.
    #[must_use]
    pub fn listen_count(&self, channel: &str) -> u32 {
        self.hub().listen_count.get(channel).copied().unwrap_or(0)
    }

    /// Calls to `send` made by the endpoint of `side` on `channel`.
    #[must_use]
    pub fn sends(&self, channel: &str, side: ExchangeRole) -> u32 {
        self.hub()
            .sends
            .get(&(channel.to_owned(), side))
            .copied()
            .unwrap_or(0)
    }

    /// Whether a listener is bound on `channel` and waiting for a peer.
    #[must_use]
    pub fn is_listening(&self, channel: &str) -> bool {
        self.hub().waiting.contains_key(channel)
    }

    /// Whether a live link exists on `channel`.
    #[must_use]
    pub fn is_linked(&self, channel: &str) -> bool {
        self.hub()
            .links
            .get(channel)
            .is_some_and(|(listener, connector)| {
                let listener = listener.upgrade();
                let connector = connector.upgrade();
                matches!((listener, connector), (Some(l), Some(c)) if l.is_connected() && c.is_connected())
            })
    }

    /// Break the link on `channel`; both sides observe a disconnect.
    ///
    /// Returns `false` if no link existed.
    pub fn drop_link(&self, channel: &str) -> bool {
        let Some((listener, connector)) = self.hub().links.remove(channel) else {
            return false;
        };
        let mut dropped = false;
        for side in [listener, connector] {
            if let Some(endpoint) = side.upgrade() {
                endpoint.peer_lost();
                dropped = true;
            }
        }
        dropped
    }
}

impl Transport for MemoryTransport {
    fn listen(&self, channel: &str, events: EventSender) -> Result<Arc<dyn Endpoint>> {
        let mut hub = self.hub();
        *hub.listen_attempts.entry(channel.to_owned()).or_default() += 1;
        if hub.listen_failures_remaining > 0 {
            hub.listen_failures_remaining -= 1;
            return Err(AppError::Transport(format!(
                "bind of '{channel}' refused"
            )));
        }
        if hub.waiting.contains_key(channel) {
            return Err(AppError::Transport(format!(
                "channel '{channel}' already has a listener"
            )));
        }
        let endpoint = Arc::new(MemoryEndpoint::new(
            channel,
            ExchangeRole::Listener,
            events,
            &self.hub,
        ));
        hub.waiting.insert(channel.to_owned(), Arc::clone(&endpoint));
        *hub.listen_count.entry(channel.to_owned()).or_default() += 1;
        debug!(channel, "memory listener bound");
        Ok(endpoint as Arc<dyn Endpoint>)
    }

    fn connect<'a>(
        &'a self,
        channel: &'a str,
        _timeout: Duration,
        events: EventSender,
    ) -> ConnectFuture<'a> {
        Box::pin(async move {
            let mut hub = self.hub();
            hub.connect_attempts += 1;

            if hub.failures_remaining > 0 {
                hub.failures_remaining -= 1;
                return Err(AppError::Transport(format!(
                    "connect to '{channel}' refused"
                )));
            }

            let listener = hub.waiting.remove(channel).ok_or_else(|| {
                AppError::Transport(format!("no listener on channel '{channel}'"))
            })?;

            let connector = Arc::new(MemoryEndpoint::new(
                channel,
                ExchangeRole::Connector,
                events,
                &self.hub,
            ));
            connector.state().peer = Some(Arc::downgrade(&listener));
            listener.state().peer = Some(Arc::downgrade(&connector));
            hub.links.insert(
                channel.to_owned(),
                (Arc::downgrade(&listener), Arc::downgrade(&connector)),
            );
            drop(hub);

            let _ = listener.events.send(EndpointEvent::Connected);
            let _ = connector.events.send(EndpointEvent::Connected);
            debug!(channel, "memory link established");

            Ok(connector as Arc<dyn Endpoint>)
        })
    }
}
