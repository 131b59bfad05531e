//! The identity triple carried by a connection: auth token, UI session id,
//! preferred agent key, and current chat session id, plus the connection
//! state machine they interact with.

use std::fmt;

/// Connection lifecycle state, mirroring `TransportState`'s shape reduced to
/// the four states this SDK's contract exposes publicly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No socket, not attempting to open one.
    #[default]
    Disconnected,
    /// A `connect()` call is in flight.
    Connecting,
    /// The socket is open and the transport is usable.
    Connected,
    /// The socket closed unexpectedly and the reconnection policy is running.
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(s)
    }
}

/// Identity fields that feed URL construction and are fanned out to
/// collaborators (notably the file uploader) whenever they change.
///
/// Field precedence for URL construction lives in `ConnectionCore`, not here;
/// this type is a plain snapshot of the current values.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    /// Bearer token sent as the `token` query parameter.
    pub auth_token: Option<String>,
    /// Client-instance id, preserved across reconnects.
    pub ui_session_id: Option<String>,
    /// Agent to start a brand new chat session with; first-connect only.
    pub preferred_agent_key: Option<String>,
    /// The chat session currently resumed, if any.
    pub current_chat_session_id: Option<String>,
    /// Set while a reconnection attempt is in flight or pending.
    pub is_reconnecting: bool,
}

impl Identity {
    /// Which single query parameter (if any) should identify the session to
    /// resume or create, per the mutual-exclusion invariant: `chat_session_id`
    /// wins when reconnecting into a known session, otherwise `agent_key` is
    /// used on a fresh connect if one was configured, otherwise neither.
    #[must_use]
    pub fn session_selector(&self) -> SessionSelector {
        if self.is_reconnecting && self.current_chat_session_id.is_some() {
            SessionSelector::ChatSession(self.current_chat_session_id.clone().unwrap())
        } else if let Some(key) = &self.preferred_agent_key {
            SessionSelector::AgentKey(key.clone())
        } else {
            SessionSelector::None
        }
    }
}

/// The single session-identifying query parameter selected for a connect URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSelector {
    /// `chat_session_id=<id>`
    ChatSession(String),
    /// `agent_key=<key>`
    AgentKey(String),
    /// Neither parameter is sent.
    None,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_with_known_session_wins_over_agent_key() {
        let identity = Identity {
            is_reconnecting: true,
            current_chat_session_id: Some("sess-1".into()),
            preferred_agent_key: Some("agent-a".into()),
            ..Identity::default()
        };
        assert_eq!(
            identity.session_selector(),
            SessionSelector::ChatSession("sess-1".into())
        );
    }

    #[test]
    fn fresh_connect_uses_agent_key_when_present() {
        let identity = Identity {
            is_reconnecting: false,
            preferred_agent_key: Some("agent-a".into()),
            ..Identity::default()
        };
        assert_eq!(
            identity.session_selector(),
            SessionSelector::AgentKey("agent-a".into())
        );
    }

    #[test]
    fn reconnect_without_known_session_falls_back_to_agent_key() {
        let identity = Identity {
            is_reconnecting: true,
            current_chat_session_id: None,
            preferred_agent_key: Some("agent-a".into()),
            ..Identity::default()
        };
        assert_eq!(
            identity.session_selector(),
            SessionSelector::AgentKey("agent-a".into())
        );
    }

    #[test]
    fn no_session_or_agent_key_selects_none() {
        let identity = Identity::default();
        assert_eq!(identity.session_selector(), SessionSelector::None);
    }

    #[test]
    fn connection_state_display() {
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
    }
}
