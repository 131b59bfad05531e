//! URL scheme coercion shared by `ConnectionCore`'s WebSocket URL builder and
//! `FileUploader`'s derived HTTP(S) endpoint. Both need the same `http<->ws`
//! mapping, just pointed in opposite directions, so it lives once here.

/// Maps an `http(s)` scheme onto its WebSocket counterpart. `ws`/`wss` pass
/// through unchanged. Any other scheme is rejected.
#[must_use]
pub fn websocket_scheme_for(scheme: &str) -> Option<&'static str> {
    match scheme {
        "http" => Some("ws"),
        "https" => Some("wss"),
        "ws" => Some("ws"),
        "wss" => Some("wss"),
        _ => None,
    }
}

/// Maps a `ws(s)` scheme onto its HTTP counterpart. `http`/`https` pass
/// through unchanged. Any other scheme is rejected.
#[must_use]
pub fn http_scheme_for(scheme: &str) -> Option<&'static str> {
    match scheme {
        "ws" => Some("http"),
        "wss" => Some("https"),
        "http" => Some("http"),
        "https" => Some("https"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_scheme_covers_all_four_inputs() {
        assert_eq!(websocket_scheme_for("http"), Some("ws"));
        assert_eq!(websocket_scheme_for("https"), Some("wss"));
        assert_eq!(websocket_scheme_for("ws"), Some("ws"));
        assert_eq!(websocket_scheme_for("wss"), Some("wss"));
        assert_eq!(websocket_scheme_for("ftp"), None);
    }

    #[test]
    fn http_scheme_covers_all_four_inputs() {
        assert_eq!(http_scheme_for("ws"), Some("http"));
        assert_eq!(http_scheme_for("wss"), Some("https"));
        assert_eq!(http_scheme_for("http"), Some("http"));
        assert_eq!(http_scheme_for("https"), Some("https"));
        assert_eq!(http_scheme_for("ftp"), None);
    }
}
