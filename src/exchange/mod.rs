//! Object exchange: the live object, its wire codec, and the coordinator
//! that keeps it in sync with a peer process.

pub mod codec;
pub mod coordinator;
pub mod events;
pub mod object;
pub mod reconnect;
pub mod shared;

pub use codec::{Codec, JsonCodec};
pub use coordinator::ExchangeCoordinator;
pub use events::{ExchangeEvent, ExchangeStats, LinkState};
pub use object::{ExchangeObject, Field};
pub use shared::{HookId, SharedObject};
