//! Transport-level configuration: timeouts, heartbeat cadence, and frame
//! size limits, in the named-constructor style
//! (`TimeoutConfig::fast()` / `::patient()` / `::unlimited()`).

use std::time::Duration;

/// Connection and heartbeat timing for a single [`crate::WebSocketTransport`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportTimeouts {
    /// How long `connect()` waits for the socket to open before failing.
    pub connect_timeout: Duration,
    /// Interval between outbound pings. `None` disables heartbeating.
    pub ping_interval: Option<Duration>,
    /// How long to wait for *any* inbound frame after a ping before treating
    /// the connection as dead and closing it with code 4000.
    pub pong_timeout: Duration,
}

impl TransportTimeouts {
    /// Tight timeouts for interactive, same-region connections.
    #[must_use]
    pub const fn fast() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            ping_interval: Some(Duration::from_secs(15)),
            pong_timeout: Duration::from_secs(5),
        }
    }

    /// Generous timeouts for high-latency or congested networks.
    #[must_use]
    pub const fn patient() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            ping_interval: Some(Duration::from_secs(30)),
            pong_timeout: Duration::from_secs(15),
        }
    }

    /// No heartbeat at all; only `connect_timeout` applies. Useful in tests
    /// against servers that don't reply to pings.
    #[must_use]
    pub const fn no_heartbeat() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            ping_interval: None,
            pong_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for TransportTimeouts {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            ping_interval: Some(Duration::from_secs(30)),
            pong_timeout: Duration::from_secs(10),
        }
    }
}

/// Immutable configuration for one [`crate::WebSocketTransport`] instance.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Fully-qualified `ws://` or `wss://` URL, including query string.
    pub url: String,
    /// WebSocket subprotocols to offer during the handshake.
    pub protocols: Vec<String>,
    /// Extra headers sent with the upgrade request.
    pub headers: Vec<(String, String)>,
    /// Timing knobs; see [`TransportTimeouts`].
    pub timeouts: TransportTimeouts,
    /// Largest single frame this transport will send or accept, in bytes.
    pub max_message_size: usize,
}

impl TransportConfig {
    /// Creates a configuration for `url` with every other field defaulted.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            protocols: Vec::new(),
            headers: Vec::new(),
            timeouts: TransportTimeouts::default(),
            max_message_size: 64 * 1024 * 1024,
        }
    }
}
