#![forbid(unsafe_code)]

//! Two-process object state synchronization over a local named pipe.
//!
//! One process takes the listener role and binds the channel; the other
//! takes the connector role and dials it. Each side wraps its copy of the
//! object in a [`SharedObject`] and hands it to an [`ExchangeCoordinator`].
//! Local edits are sent to the peer as whole snapshots; inbound snapshots
//! are applied without echoing back.

pub mod config;
pub mod console;
pub mod errors;
pub mod exchange;
pub mod models;
pub mod transport;

pub use config::{ExchangeConfig, ExchangeSettings};
pub use errors::{AppError, Result};
pub use exchange::{ExchangeCoordinator, ExchangeEvent, ExchangeStats, LinkState, SharedObject};
pub use models::role::ExchangeRole;
