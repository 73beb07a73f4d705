//! Exchange coordinator: keeps one object in sync with a peer process.
//!
//! The coordinator owns one transport endpoint at a time, in the role fixed
//! by the first [`start`](ExchangeCoordinator::start):
//!
//! - **Listener** binds the channel and waits for a peer. When the peer
//!   drops, it reports the disconnect and immediately binds a fresh
//!   listening endpoint on the same channel name.
//! - **Connector** dials the channel with a bounded timeout. When the dial
//!   fails or the link later drops, it retries once immediately and then
//!   arms a fixed-interval [`ReconnectSupervisor`].
//!
//! ## Locking
//!
//! The live object's mutex is the outer lock, the coordinator state mutex
//! the inner one. Local change hooks, inbound applies and `stop` all run
//! inside the object lock, so once `stop` returns no inbound apply or
//! outbound send can still happen. No code path takes the object lock while
//! holding the state lock.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::{validate_channel_name, ExchangeSettings};
use crate::exchange::codec::{Codec, JsonCodec};
use crate::exchange::events::{ExchangeEvent, ExchangeStats, LinkState, StatsCounters};
use crate::exchange::object::ExchangeObject;
use crate::exchange::reconnect::{
    AttemptFuture, ReconnectHandle, ReconnectSupervisor, RecoveryKind,
};
use crate::exchange::shared::{HookId, SharedObject};
use crate::models::role::ExchangeRole;
use crate::transport::{Endpoint, EndpointEvent, EventReceiver, Transport};
use crate::{AppError, Result};

/// Capacity of the observer broadcast channel.
const EVENT_CAPACITY: usize = 64;

/// The endpoint currently owned by the coordinator.
struct ActiveEndpoint {
    id: u64,
    endpoint: Arc<dyn Endpoint>,
}

struct CoordinatorState {
    channel_name: String,
    role: ExchangeRole,
    started: bool,
    connected: bool,
    endpoint: Option<ActiveEndpoint>,
    reconnect: Option<ReconnectHandle>,
    session: CancellationToken,
    next_id: u64,
}

impl CoordinatorState {
    fn link_state(&self) -> LinkState {
        if !self.started {
            LinkState::Idle
        } else if self.connected {
            LinkState::Connected
        } else if self.role == ExchangeRole::Listener && self.endpoint.is_some() {
            LinkState::Listening
        } else {
            LinkState::Reconnecting
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

struct Inner<T> {
    object: SharedObject<T>,
    transport: Arc<dyn Transport>,
    codec: Arc<dyn Codec<T>>,
    settings: ExchangeSettings,
    events: broadcast::Sender<ExchangeEvent<T>>,
    state: Mutex<CoordinatorState>,
    stats: StatsCounters,
}

/// Synchronizes one [`SharedObject`] with the coordinator in the peer
/// process.
///
/// Dropping the coordinator stops it and detaches it from the object; the
/// object itself stays with the application.
pub struct ExchangeCoordinator<T: ExchangeObject> {
    inner: Arc<Inner<T>>,
    hook: HookId,
}

impl<T: ExchangeObject> ExchangeCoordinator<T> {
    /// Bind a coordinator to `object` with the JSON codec and default
    /// timings. Nothing is opened until [`start`](Self::start).
    #[must_use]
    pub fn new(object: SharedObject<T>, transport: Arc<dyn Transport>) -> Self {
        Self::with_options(
            object,
            transport,
            ExchangeSettings::default(),
            Arc::new(JsonCodec::new()),
        )
    }

    /// Bind a coordinator with explicit settings and codec.
    #[must_use]
    pub fn with_options(
        object: SharedObject<T>,
        transport: Arc<dyn Transport>,
        settings: ExchangeSettings,
        codec: Arc<dyn Codec<T>>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let inner = Arc::new(Inner {
            object,
            transport,
            codec,
            settings,
            events,
            state: Mutex::new(CoordinatorState {
                channel_name: String::new(),
                role: ExchangeRole::Unset,
                started: false,
                connected: false,
                endpoint: None,
                reconnect: None,
                session: CancellationToken::new(),
                next_id: 0,
            }),
            stats: StatsCounters::default(),
        });

        let weak: Weak<Inner<T>> = Arc::downgrade(&inner);
        let hook = inner.object.subscribe(move |_, value| {
            if let Some(inner) = weak.upgrade() {
                inner.publish_local(value);
            }
        });

        Self { inner, hook }
    }

    /// Start exchanging on `channel_name` in `role`.
    ///
    /// A listener binds its endpoint before this returns. A connector makes
    /// one bounded connect attempt and, if it fails, arms the reconnect
    /// supervisor; connect failures are never returned.
    ///
    /// Calling `start` again while started only records a new channel name,
    /// used by the next rebind or reconnect. The role recorded by the first
    /// call is kept for the lifetime of the coordinator.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for an invalid channel name or an unset
    /// role, and `AppError::Transport` if the listener cannot bind.
    pub async fn start(&self, channel_name: &str, role: ExchangeRole) -> Result<()> {
        validate_channel_name(channel_name)?;
        if !role.is_set() {
            return Err(AppError::Config(
                "role must be 'listener' or 'connector'".into(),
            ));
        }

        let (role, session) = {
            let mut state = self.inner.state();
            if state.started {
                if state.channel_name != channel_name {
                    info!(
                        previous = %state.channel_name,
                        channel = channel_name,
                        "channel name updated"
                    );
                    state.channel_name = channel_name.to_owned();
                }
                if state.role != role {
                    warn!(recorded = %state.role, requested = %role, "role is fixed; ignoring");
                }
                return Ok(());
            }

            if state.role.is_set() && state.role != role {
                warn!(
                    recorded = %state.role,
                    requested = %role,
                    "role is fixed; keeping recorded role"
                );
            } else {
                state.role = role;
            }
            state.channel_name = channel_name.to_owned();
            state.started = true;
            state.session = CancellationToken::new();
            (state.role, state.session.clone())
        };

        info!(channel = channel_name, %role, "exchange starting");

        match role {
            ExchangeRole::Listener => {
                if let Err(err) = self.inner.bind_listener(&session) {
                    self.stop();
                    return Err(err);
                }
            }
            ExchangeRole::Connector => {
                if !self.inner.try_connect(&session).await {
                    self.inner.arm_recovery(RecoveryKind::Reconnect, &session);
                }
            }
            ExchangeRole::Unset => {}
        }

        Ok(())
    }

    /// Stop exchanging. Safe to call in any state, any number of times.
    ///
    /// Cancels a pending reconnect, closes the active endpoint and reports
    /// `ConnectionStateChange(false)` if a peer was attached.
    pub fn stop(&self) {
        let (endpoint, reconnect, was_started) = self.inner.object.read(|_| {
            let mut state = self.inner.state();
            let was_started = state.started;
            state.started = false;
            state.session.cancel();
            (state.endpoint.take(), state.reconnect.take(), was_started)
        });

        drop(reconnect);
        if let Some(active) = endpoint {
            active.endpoint.close();
        }
        self.inner.mark_disconnected();

        if was_started {
            info!("exchange stopped");
        }
    }

    /// Subscribe to coordinator events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ExchangeEvent<T>> {
        self.inner.events.subscribe()
    }

    /// The live object this coordinator synchronizes.
    #[must_use]
    pub fn object(&self) -> &SharedObject<T> {
        &self.inner.object
    }

    /// Whether `start` has been called and `stop` has not.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.inner.state().started
    }

    /// Whether a peer is attached.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.state().connected
    }

    /// Current connection phase.
    #[must_use]
    pub fn link_state(&self) -> LinkState {
        self.inner.state().link_state()
    }

    /// Role recorded by the first `start`.
    #[must_use]
    pub fn role(&self) -> ExchangeRole {
        self.inner.state().role
    }

    /// Most recently recorded channel name.
    #[must_use]
    pub fn channel_name(&self) -> String {
        self.inner.state().channel_name.clone()
    }

    /// Whether a reconnect or rebind supervisor is armed.
    #[must_use]
    pub fn is_recovering(&self) -> bool {
        self.inner
            .state()
            .reconnect
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Traffic counters.
    #[must_use]
    pub fn stats(&self) -> ExchangeStats {
        self.inner.stats.snapshot()
    }
}

impl<T: ExchangeObject> Drop for ExchangeCoordinator<T> {
    fn drop(&mut self) {
        self.stop();
        self.inner.object.unsubscribe(self.hook);
    }
}

impl<T: ExchangeObject> Inner<T> {
    fn state(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_started(&self) -> bool {
        self.state().started
    }

    fn is_current(&self, id: u64) -> bool {
        self.state()
            .endpoint
            .as_ref()
            .is_some_and(|active| active.id == id)
    }

    /// Local change hook. Runs inside the object lock.
    fn publish_local(&self, object: &T) {
        let endpoint = {
            let state = self.state();
            if !state.started {
                return;
            }
            state
                .endpoint
                .as_ref()
                .map(|active| Arc::clone(&active.endpoint))
        };
        let Some(endpoint) = endpoint else {
            debug!("no endpoint; local change not sent");
            return;
        };

        let payload = match self.codec.encode(object) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%err, "failed to encode local change");
                return;
            }
        };

        // A broken link surfaces as a Disconnected event; the write is not retried.
        match endpoint.send(&payload) {
            Ok(()) => {
                self.stats.record_sent();
                debug!(bytes = payload.len(), "snapshot sent");
            }
            Err(AppError::NotConnected(msg)) => {
                debug!(%msg, "no peer; local change not sent");
            }
            Err(err) => {
                warn!(%err, "snapshot write failed");
            }
        }
    }

    /// Decode an inbound snapshot and copy it onto the live object.
    fn apply_inbound(&self, payload: &[u8]) {
        let shape = self.object.snapshot();
        let transient = match self.codec.decode(payload, &shape) {
            Ok(transient) => transient,
            Err(err) => {
                self.stats.record_rejected();
                warn!(%err, "dropping inbound update");
                return;
            }
        };

        match self
            .object
            .apply_remote_if(&transient, || self.is_started())
        {
            Ok(true) => {
                self.stats.record_applied();
                debug!(bytes = payload.len(), "remote update applied");
                let _ = self
                    .events
                    .send(ExchangeEvent::ObjectChanged(self.object.clone()));
            }
            Ok(false) => {
                debug!("exchange stopped; inbound update discarded");
            }
            Err(err) => {
                self.stats.record_rejected();
                warn!(%err, "dropping inbound update");
            }
        }
    }

    /// Record that endpoint `id` reached its peer.
    ///
    /// Ignored unless the exchange is started and `id` is still the active
    /// endpoint, checked under the same state lock that sets the flag.
    fn mark_connected(&self, id: u64) {
        let state = &mut *self.state();
        let current = state.started
            && state
                .endpoint
                .as_ref()
                .is_some_and(|active| active.id == id);
        if !current || state.connected {
            return;
        }
        state.connected = true;
        info!(connected = true, "connection state changed");
        let _ = self.events.send(ExchangeEvent::ConnectionStateChange(true));
    }

    fn mark_disconnected(&self) {
        let state = &mut *self.state();
        if !state.connected {
            return;
        }
        state.connected = false;
        info!(connected = false, "connection state changed");
        let _ = self.events.send(ExchangeEvent::ConnectionStateChange(false));
    }

    /// Take ownership of a new endpoint and start draining its events.
    ///
    /// Returns `false` (and closes the endpoint) if the exchange was stopped
    /// in the meantime.
    fn install_endpoint(
        self: &Arc<Self>,
        endpoint: Arc<dyn Endpoint>,
        events: EventReceiver,
        session: &CancellationToken,
    ) -> bool {
        let (id, channel, role, retired) = {
            let mut state = self.state();
            if !state.started || session.is_cancelled() {
                drop(state);
                endpoint.close();
                return false;
            }
            let id = state.next_id();
            let retired = state.endpoint.replace(ActiveEndpoint { id, endpoint });
            (id, state.channel_name.clone(), state.role, retired)
        };

        if let Some(retired) = retired {
            retired.endpoint.close();
        }

        let span = info_span!("exchange", channel = %channel, %role, endpoint = id);
        tokio::spawn(
            Arc::clone(self)
                .dispatch(id, events, session.clone())
                .instrument(span),
        );
        true
    }

    /// Drain one endpoint's events until it disconnects or is retired.
    async fn dispatch(
        self: Arc<Self>,
        id: u64,
        mut events: EventReceiver,
        session: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                biased;
                () = session.cancelled() => break,
                event = events.recv() => event,
            };
            let Some(event) = event else {
                debug!("endpoint event channel closed");
                break;
            };
            if !self.is_current(id) {
                debug!("endpoint retired; ignoring its events");
                break;
            }

            match event {
                EndpointEvent::Connected => self.mark_connected(id),
                EndpointEvent::Data(payload) => self.apply_inbound(&payload),
                EndpointEvent::Disconnected => {
                    self.on_disconnected(id, &session).await;
                    break;
                }
            }
        }
    }

    async fn on_disconnected(self: &Arc<Self>, id: u64, session: &CancellationToken) {
        let (role, retired) = {
            let mut state = self.state();
            if !state.started {
                return;
            }
            let retired = match state.endpoint.take() {
                Some(active) if active.id == id => Some(active),
                other => {
                    state.endpoint = other;
                    return;
                }
            };
            (state.role, retired)
        };

        if let Some(retired) = retired {
            retired.endpoint.close();
        }
        self.mark_disconnected();

        match role {
            ExchangeRole::Listener => {
                if let Err(err) = self.bind_listener(session) {
                    error!(%err, "listener rebind failed; retrying");
                    self.arm_recovery(RecoveryKind::Rebind, session);
                }
            }
            ExchangeRole::Connector => {
                if !self.try_connect(session).await {
                    self.arm_recovery(RecoveryKind::Reconnect, session);
                }
            }
            ExchangeRole::Unset => {}
        }
    }

    /// Bind a listening endpoint on the recorded channel name.
    fn bind_listener(self: &Arc<Self>, session: &CancellationToken) -> Result<()> {
        let channel = {
            let state = self.state();
            if !state.started {
                return Ok(());
            }
            state.channel_name.clone()
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let endpoint = self.transport.listen(&channel, tx)?;
        if self.install_endpoint(endpoint, rx, session) {
            info!(channel = %channel, "listening for peer");
        }
        Ok(())
    }

    /// One bounded connect attempt on the recorded channel name.
    async fn try_connect(self: &Arc<Self>, session: &CancellationToken) -> bool {
        let channel = {
            let state = self.state();
            if !state.started || session.is_cancelled() {
                return false;
            }
            state.channel_name.clone()
        };

        self.stats.record_connect_attempt();
        let (tx, rx) = mpsc::unbounded_channel();
        match self
            .transport
            .connect(&channel, self.settings.connect_timeout, tx)
            .await
        {
            Ok(endpoint) => self.install_endpoint(endpoint, rx, session),
            Err(err) => {
                debug!(%err, channel = %channel, "connect attempt failed");
                false
            }
        }
    }

    /// Arm a recovery supervisor, replacing any armed one.
    fn arm_recovery(self: &Arc<Self>, kind: RecoveryKind, session: &CancellationToken) {
        let mut state = self.state();
        if !state.started || session.is_cancelled() {
            return;
        }
        let id = state.next_id();
        let weak = Arc::downgrade(self);
        let attempt_session = session.clone();
        let attempt = move || -> AttemptFuture {
            let weak = weak.clone();
            let session = attempt_session.clone();
            Box::pin(async move {
                match weak.upgrade() {
                    Some(inner) => inner.recovery_tick(id, kind, &session).await,
                    None => true,
                }
            })
        };

        let supervisor = ReconnectSupervisor::new(
            id,
            kind,
            self.settings.reconnect_interval,
            session.child_token(),
            attempt,
        );
        let replaced = state.reconnect.replace(supervisor.spawn());
        drop(state);

        if replaced.is_some() {
            debug!("replaced armed supervisor");
        }
        info!(?kind, interval = ?self.settings.reconnect_interval, "recovery armed");
    }

    async fn recovery_tick(
        self: &Arc<Self>,
        id: u64,
        kind: RecoveryKind,
        session: &CancellationToken,
    ) -> bool {
        let restored = match kind {
            RecoveryKind::Reconnect => self.try_connect(session).await,
            RecoveryKind::Rebind => match self.bind_listener(session) {
                Ok(()) => true,
                Err(err) => {
                    warn!(%err, "listener rebind failed");
                    false
                }
            },
        };

        if restored {
            let disposed = {
                let mut state = self.state();
                match state.reconnect.take() {
                    Some(handle) if handle.id() == id => Some(handle),
                    other => {
                        state.reconnect = other;
                        None
                    }
                }
            };
            drop(disposed);
        }
        restored
    }
}
