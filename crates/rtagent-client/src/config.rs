//! Fluent configuration for [`crate::ConnectionCore`], in the
//! `ConnectionConfig`/`TimeoutConfig` style of grouped, named-constructor
//! settings structs.

use std::collections::HashMap;
use std::time::Duration;

use rtagent_core::ReconnectionConfig;
use serde::{Deserialize, Serialize};

/// Everything needed to construct a [`crate::ConnectionCore`].
///
/// `api_url` is the only field with no usable default. At least one of
/// `auth_token` or an [`crate::AuthProvider`] passed to
/// [`crate::ConnectionCore::new`] must resolve to a token before
/// `connect()` is called.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the realtime agent service, e.g. `https://agents.example.com`.
    /// Scheme is coerced to `ws`/`wss` and the path replaced with `/api/rt/ws`.
    pub api_url: String,

    /// Bearer token to connect with, if not supplied by an `AuthProvider`.
    pub auth_token: Option<String>,

    /// Client-instance identifier, preserved across reconnects. A legacy
    /// `session_id` field is accepted as an alias for backward compatibility
    /// with older configuration documents.
    #[serde(alias = "session_id")]
    pub ui_session_id: Option<String>,

    /// Which agent a brand-new chat session should start with. Applied only
    /// on first connect, never on a reconnect that resumes a known session.
    pub preferred_agent_key: Option<String>,

    /// Whether an unexpected close starts the [`ReconnectionPolicy`](rtagent_core::ReconnectionPolicy).
    pub auto_reconnect: bool,

    /// Backoff/jitter/attempt-limit tuning for reconnection.
    pub reconnection: ReconnectionConfig,

    /// How long `connect()` waits for the socket to open.
    #[serde(with = "duration_millis")]
    pub connection_timeout: Duration,

    /// Heartbeat ping cadence. `None` disables heartbeating.
    #[serde(with = "option_duration_millis")]
    pub ping_interval: Option<Duration>,

    /// How long to wait for any inbound frame after a ping before closing.
    #[serde(with = "duration_millis")]
    pub pong_timeout: Duration,

    /// Largest single WebSocket frame this client will send or accept.
    pub max_message_size: usize,

    /// Enables verbose `tracing::debug!` logging of buffered-byte counts
    /// around latency-sensitive sends (notably `client_wants_cancel`).
    pub debug: bool,

    /// Extra headers sent with the WebSocket upgrade request.
    pub headers: HashMap<String, String>,

    /// WebSocket subprotocols to offer during the handshake.
    pub protocols: Vec<String>,

    /// Inert configuration read by an external turn-manager collaborator;
    /// the core never branches on it.
    pub enable_turn_manager: bool,

    /// Inert configuration read by an external audio pipeline collaborator.
    pub enable_audio: bool,

    /// Opaque audio pipeline settings, passed through unexamined.
    pub audio_config: Option<serde_json::Value>,

    /// Largest file `FileUploader::upload_file` will accept, in bytes.
    pub max_upload_size: u64,

    /// If non-empty, the only MIME types `FileUploader::upload_file` accepts.
    pub allowed_mime_types: Vec<String>,

    /// Largest batch `FileUploader::upload_files` will accept.
    pub max_files_per_message: usize,

    /// Upper bound on the `SessionStore` session-index cache.
    pub max_cached_sessions: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            auth_token: None,
            ui_session_id: None,
            preferred_agent_key: None,
            auto_reconnect: true,
            reconnection: ReconnectionConfig::default(),
            connection_timeout: Duration::from_secs(10),
            ping_interval: Some(Duration::from_secs(30)),
            pong_timeout: Duration::from_secs(10),
            max_message_size: 64 * 1024 * 1024,
            debug: false,
            headers: HashMap::new(),
            protocols: Vec::new(),
            enable_turn_manager: false,
            enable_audio: false,
            audio_config: None,
            max_upload_size: 25 * 1024 * 1024,
            allowed_mime_types: Vec::new(),
            max_files_per_message: 10,
            max_cached_sessions: 500,
        }
    }
}

impl ClientConfig {
    /// Starts a config with `api_url` set and everything else defaulted.
    #[must_use]
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Self::default()
        }
    }

    /// Tight timeouts and a fast, bounded reconnection policy, for
    /// interactive same-region deployments.
    #[must_use]
    pub fn fast(api_url: impl Into<String>) -> Self {
        Self {
            connection_timeout: Duration::from_secs(5),
            ping_interval: Some(Duration::from_secs(15)),
            pong_timeout: Duration::from_secs(5),
            reconnection: ReconnectionConfig::fast(),
            ..Self::new(api_url)
        }
    }

    /// Generous timeouts and an unlimited, slow-backoff reconnection policy,
    /// for long-lived background connections over uncertain networks.
    #[must_use]
    pub fn patient(api_url: impl Into<String>) -> Self {
        Self {
            connection_timeout: Duration::from_secs(30),
            ping_interval: Some(Duration::from_secs(30)),
            pong_timeout: Duration::from_secs(15),
            reconnection: ReconnectionConfig::patient(),
            ..Self::new(api_url)
        }
    }
}

mod duration_millis {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

mod option_duration_millis {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_some(&value.map(|d| d.as_millis() as u64))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ping_interval_is_thirty_seconds() {
        let config = ClientConfig::new("https://agents.example.com");
        assert_eq!(config.ping_interval, Some(Duration::from_secs(30)));
    }

    #[test]
    fn legacy_session_id_field_maps_to_ui_session_id() {
        let json = serde_json::json!({
            "api_url": "https://agents.example.com",
            "session_id": "legacy-ui-1",
        });
        let config: ClientConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.ui_session_id.as_deref(), Some("legacy-ui-1"));
    }

    #[test]
    fn fast_preset_shortens_connection_timeout() {
        let config = ClientConfig::fast("https://agents.example.com");
        assert_eq!(config.connection_timeout, Duration::from_secs(5));
    }
}
