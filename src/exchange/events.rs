//! Observable coordinator events and status snapshots.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::exchange::shared::SharedObject;

/// Event delivered to coordinator subscribers.
#[derive(Debug, Clone)]
pub enum ExchangeEvent<T> {
    /// A remote update was fully applied to the live object.
    ObjectChanged(SharedObject<T>),
    /// The link to the peer came up (`true`) or went down (`false`).
    ConnectionStateChange(bool),
}

/// Coarse connection phase of a coordinator.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LinkState {
    /// Not started, or stopped.
    Idle,
    /// Listener bound and waiting for a peer.
    Listening,
    /// Link lost or never established; recovery in progress.
    Reconnecting,
    /// Peer attached.
    Connected,
}

/// Point-in-time counters for one coordinator.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct ExchangeStats {
    /// Snapshots handed to the endpoint.
    pub sent: u64,
    /// Inbound updates applied to the live object.
    pub applied: u64,
    /// Inbound updates dropped as malformed or mismatched.
    pub rejected: u64,
    /// Connect attempts made in the connector role.
    pub connect_attempts: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    sent: AtomicU64,
    applied: AtomicU64,
    rejected: AtomicU64,
    connect_attempts: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_applied(&self) {
        self.applied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> ExchangeStats {
        ExchangeStats {
            sent: self.sent.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
        }
    }
}
