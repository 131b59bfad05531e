//! # rtagent
//!
//! Rust client SDK for a bidirectional realtime agent service: a single
//! WebSocket connection carrying streamed agent turns, catalog/session
//! events and control commands, with an independent HTTP path for file
//! uploads.
//!
//! This crate is a thin facade over three layered crates:
//!
//! - [`rtagent_core`] — transport-agnostic foundation: error taxonomy, the
//!   name-keyed event bus, the reconnection policy, and the identity /
//!   chat-session data model. No networking dependency.
//! - [`rtagent_transport`] — the WebSocket transport: framing, heartbeat
//!   liveness, and close-code classification.
//! - [`rtagent_client`] — [`ConnectionCore`], the orchestrating handle
//!   applications hold, plus the stream processor, session store, and file
//!   uploader it composes.
//!
//! ## Quick start
//!
//! ```no_run
//! use rtagent::prelude::*;
//!
//! # async fn run() -> RtResult<()> {
//! let config = ClientConfig::new("https://agents.example.com");
//! let core = ConnectionCore::new(config, None, None)?;
//! core.connect().await?;
//! core.wait_for_initialization().await;
//! core.text_input("hello", vec![]).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub use rtagent_core;
pub use rtagent_transport;
pub use rtagent_client;

pub use rtagent_core::{
    group_for, http_scheme_for, parse_server_timestamp, websocket_scheme_for, ChatSessionEntry,
    ConnectionState, ErrorSource, EventBus, Identity, ListenerId, ReconnectionConfig,
    ReconnectionPolicy, RtError, RtResult, SessionGroup, SessionSelector,
};
pub use rtagent_transport::{Inbound, TransportConfig, TransportHandlers, TransportTimeouts, WebSocketTransport};
pub use rtagent_client::{
    is_whitelisted, Accumulator, AudioSink, AuthProvider, ClientCommand, ClientConfig,
    CompletedMessage, ConnectionCore, FileUploader, GroupedSessions, SessionStore,
    StaticAuthProvider, StreamProcessor, ToolCallState, ToolNotification, ToolNotificationState,
    UploadFile, UploadLimits, UploadProgress, UploadedFile,
};

/// Everything a typical application needs in scope to connect, drive a
/// session, and react to events, in one `use rtagent::prelude::*;`.
pub mod prelude {
    pub use crate::{
        ChatSessionEntry, ClientCommand, ClientConfig, ConnectionCore, ConnectionState, EventBus,
        FileUploader, RtError, RtResult, SessionStore, StaticAuthProvider, UploadFile,
    };
}
