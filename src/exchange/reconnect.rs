//! Fixed-interval reconnect supervisor.
//!
//! A [`ReconnectSupervisor`] repeatedly runs one recovery attempt (a bounded
//! connect for the connector, a rebind for the listener) until an attempt
//! succeeds. The first attempt runs one `interval` after the supervisor is
//! spawned, later attempts every `interval`. There is no backoff and no
//! attempt limit.
//!
//! The coordinator keeps at most one [`ReconnectHandle`]. Replacing or
//! dropping the handle cancels its task, so arming a new supervisor never
//! stacks timers.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

/// Future produced by one recovery attempt; resolves to `true` on success.
pub type AttemptFuture = Pin<Box<dyn Future<Output = bool> + Send>>;

/// What a supervisor is trying to restore.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RecoveryKind {
    /// Dial the listener again (connector role).
    Reconnect,
    /// Bind a fresh listening endpoint (listener role).
    Rebind,
}

/// Builder for a recovery loop.
///
/// Call [`spawn`](Self::spawn) to start the background task.
pub struct ReconnectSupervisor<F> {
    id: u64,
    kind: RecoveryKind,
    interval: Duration,
    cancel: CancellationToken,
    attempt: F,
}

impl<F> ReconnectSupervisor<F>
where
    F: Fn() -> AttemptFuture + Send + 'static,
{
    /// Construct a supervisor (does not start the timer yet).
    #[must_use]
    pub fn new(
        id: u64,
        kind: RecoveryKind,
        interval: Duration,
        cancel: CancellationToken,
        attempt: F,
    ) -> Self {
        Self {
            id,
            kind,
            interval,
            cancel,
            attempt,
        }
    }

    /// Spawn the background loop and return the owning handle.
    #[must_use]
    pub fn spawn(self) -> ReconnectHandle {
        let cancel = self.cancel.clone();
        let span = info_span!("reconnect", id = self.id, kind = ?self.kind);
        let join_handle = tokio::spawn(
            Self::run(self.kind, self.interval, self.cancel, self.attempt).instrument(span),
        );
        ReconnectHandle {
            id: self.id,
            kind: self.kind,
            join_handle: Some(join_handle),
            cancel,
        }
    }

    async fn run(kind: RecoveryKind, interval: Duration, cancel: CancellationToken, attempt: F) {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempts: u32 = 0;

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!(attempts, "supervisor cancelled");
                    return;
                }
                _ = ticker.tick() => {}
            }

            attempts += 1;
            let restored = tokio::select! {
                () = cancel.cancelled() => {
                    debug!(attempts, "supervisor cancelled mid-attempt");
                    return;
                }
                restored = attempt() => restored,
            };

            if restored {
                info!(attempts, ?kind, "link restored");
                return;
            }
            debug!(attempts, ?kind, "recovery attempt failed");
        }
    }
}

/// Owned handle to a running supervisor. Dropping it cancels the task.
pub struct ReconnectHandle {
    id: u64,
    kind: RecoveryKind,
    join_handle: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl Drop for ReconnectHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl ReconnectHandle {
    /// Identifier assigned when the supervisor was armed.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// What this supervisor is restoring.
    #[must_use]
    pub fn kind(&self) -> RecoveryKind {
        self.kind
    }

    /// Whether the background loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join_handle
            .as_ref()
            .map_or(true, JoinHandle::is_finished)
    }

    /// Cancel the loop and wait for it to exit.
    pub async fn await_completion(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.await;
        }
    }
}
