//! WebSocket transport layer for the realtime agent client SDK: a single
//! owned socket with text/binary framing and ping/pong liveness checking.

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod config;
pub mod transport;

pub use config::{TransportConfig, TransportTimeouts};
pub use transport::{Inbound, TransportHandlers, WebSocketTransport};
