//! The `AuthProvider` collaborator: an injected source of auth token / UI
//! session id, and an optional token-refresh signal.
//!
//! Shaped after `turbomcp-auth::oauth2::client`'s provider trait, reduced to
//! the two fields this SDK actually needs from an authentication
//! collaborator.

use async_trait::async_trait;
use tokio::sync::watch;

/// Supplies auth credentials `ConnectionCore` does not already have, and
/// optionally signals token refreshes while connected.
///
/// A config-supplied `auth_token` / `ui_session_id` always takes precedence
/// over values from this collaborator (see [`crate::config::ClientConfig`]);
/// the provider is consulted only for fields still `None` at connect time.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Current auth token, if available without a network round trip.
    async fn auth_token(&self) -> Option<String> {
        None
    }

    /// Current UI session id, if this collaborator owns one.
    async fn ui_session_id(&self) -> Option<String> {
        None
    }

    /// A channel that yields a new token whenever one is issued. `None`
    /// means this provider never refreshes tokens out of band.
    fn token_refresh_channel(&self) -> Option<watch::Receiver<String>> {
        None
    }
}

/// A trivial [`AuthProvider`] that always returns the same fixed token and
/// UI session id, for tests and for apps with no refresh story.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthProvider {
    token: Option<String>,
    ui_session_id: Option<String>,
}

impl StaticAuthProvider {
    /// Creates a provider that always returns `token`.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ui_session_id: None,
        }
    }

    /// Attaches a fixed UI session id.
    #[must_use]
    pub fn with_ui_session_id(mut self, ui_session_id: impl Into<String>) -> Self {
        self.ui_session_id = Some(ui_session_id.into());
        self
    }
}

#[async_trait]
impl AuthProvider for StaticAuthProvider {
    async fn auth_token(&self) -> Option<String> {
        self.token.clone()
    }

    async fn ui_session_id(&self) -> Option<String> {
        self.ui_session_id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_provider_returns_fixed_token() {
        let provider = StaticAuthProvider::new("tok-1").with_ui_session_id("ui-1");
        assert_eq!(provider.auth_token().await, Some("tok-1".to_string()));
        assert_eq!(provider.ui_session_id().await, Some("ui-1".to_string()));
        assert!(provider.token_refresh_channel().is_none());
    }
}
