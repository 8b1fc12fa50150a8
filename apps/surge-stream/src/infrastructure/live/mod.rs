//! Live Tick Adapter
//!
//! WebSocket client for the quote socket.
//!
//! - `client`: subscription lifecycle and the per-connection task
//! - `codec`: text frame decoding
//! - `messages`: wire types
//! - `reconnect`: fixed-delay retry budget
//! - `store`: guarded subscription state and its `watch` view

pub mod client;
pub mod codec;
pub mod messages;
pub mod reconnect;
pub mod store;

pub use client::{LiveStreamError, LiveTickStream};
pub use codec::{CodecError, TickCodec};
pub use messages::{ErrorMessage, LiveMessage, StatusMessage, TickMessage};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use store::TickStateStore;
