//! Transport-agnostic foundation for the realtime agent client SDK.
//!
//! This crate has no networking dependency: it defines the error taxonomy,
//! the name-keyed [`EventBus`](event_bus::EventBus), the
//! [`ReconnectionPolicy`](reconnection::ReconnectionPolicy), and the identity
//! / chat-session data model shared by `rtagent-transport` and
//! `rtagent-client`.

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod error;
pub mod event_bus;
pub mod identity;
pub mod reconnection;
pub mod scheme;
pub mod session;

pub use error::{ErrorSource, RtError, RtResult};
pub use event_bus::{EventBus, ListenerId};
pub use identity::{ConnectionState, Identity, SessionSelector};
pub use reconnection::{ReconnectionConfig, ReconnectionPolicy};
pub use scheme::{http_scheme_for, websocket_scheme_for};
pub use session::{group_for, parse_server_timestamp, ChatSessionEntry, SessionGroup};
