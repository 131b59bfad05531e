//! Connection orchestration for the realtime agent client SDK: owns the
//! WebSocket lifecycle, dispatches inbound frames to the [`StreamProcessor`]
//! and [`SessionStore`], and exposes the outbound command surface
//! applications call to drive a session.

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod auth;
pub mod config;
pub mod connection_core;
pub mod file_uploader;
pub mod messages;
pub mod session_store;
pub mod stream_processor;

pub use auth::{AuthProvider, StaticAuthProvider};
pub use config::ClientConfig;
pub use connection_core::{AudioSink, ConnectionCore};
pub use file_uploader::{FileUploader, UploadFile, UploadLimits, UploadProgress, UploadedFile};
pub use messages::ClientCommand;
pub use session_store::{GroupedSessions, SessionStore};
pub use stream_processor::{is_whitelisted, Accumulator, CompletedMessage, StreamProcessor, ToolCallState, ToolNotification, ToolNotificationState};
