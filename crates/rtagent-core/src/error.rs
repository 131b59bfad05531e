//! Error taxonomy for the realtime agent client SDK.

use std::fmt;

/// Where an [`RtError::Protocol`] or [`RtError::Connection`] failure originated,
/// mirrored on the wire as `error.source` so applications can branch on it
/// without string-matching the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorSource {
    /// Missing or rejected authentication.
    Auth,
    /// The underlying socket failed to open, stayed open, or closed unexpectedly.
    Connection,
    /// A frame could not be parsed as the expected shape.
    MessageParser,
    /// A file upload failed validation or transport.
    Upload,
}

impl fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Auth => "auth",
            Self::Connection => "connection",
            Self::MessageParser => "message_parser",
            Self::Upload => "upload",
        };
        f.write_str(s)
    }
}

/// The unified error type returned by every fallible operation in this SDK.
///
/// Variants are grouped the way [`ErrorSource`] groups them on the wire: each
/// carries enough context to build a human-readable message and enough
/// structure for callers to decide whether to retry.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RtError {
    /// No auth token was available at connect time.
    #[error(
        "authentication required: no auth token was supplied directly or by the configured \
         AuthProvider; set ClientConfig::auth_token or ClientConfig::auth_provider before calling connect()"
    )]
    AuthenticationRequired,

    /// The server rejected the connection (closed during the handshake with
    /// an auth-shaped reason, or the initial HTTP upgrade was refused).
    #[error("authentication failed: {reason}")]
    AuthenticationFailed {
        /// Reason reported by the server or the underlying transport.
        reason: String,
    },

    /// `connect()` was called while a previous `connect()` is still in flight.
    #[error("connect() is already in progress for this client")]
    AlreadyConnecting,

    /// The socket did not finish opening before `connection_timeout` elapsed.
    #[error("connection attempt timed out after {elapsed_ms}ms (connection_timeout)")]
    ConnectionTimeout {
        /// Milliseconds waited before giving up.
        elapsed_ms: u64,
    },

    /// Opening or maintaining the socket failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// An operation that requires an open socket was attempted while
    /// disconnected (e.g. `send_json`, `send_binary`).
    #[error("not connected: cannot perform this operation while the socket is closed")]
    NotConnected,

    /// The configured `api_url` could not be turned into a WebSocket URL
    /// (unsupported scheme, unparsable URL, etc).
    #[error("invalid configuration: {0}")]
    ConfigurationError(String),

    /// A received text frame was not valid JSON, or was valid JSON but not a
    /// recognizable event envelope (no `type` field).
    #[error("failed to parse server message: {0}")]
    MessageParseError(String),

    /// `upload_file` rejected a file before performing any network I/O.
    #[error("upload validation failed: {0}")]
    UploadValidation(String),

    /// An HTTP error, timeout, or transport failure while uploading a file.
    #[error("file upload failed: {0}")]
    UploadTransport(String),

    /// The server responded 2xx but the body was not the expected JSON shape.
    #[error("upload succeeded but the server response could not be parsed: {0}")]
    UploadResponseMalformed(String),

    /// One file in a batch failed; prior files in the batch may have
    /// already succeeded and are not rolled back.
    #[error(
        "upload {index}/{total} failed (file \"{filename}\"): {reason}; {succeeded} prior file(s) in this batch already succeeded"
    )]
    BatchUploadFailed {
        /// 1-based index of the failed file within the batch.
        index: usize,
        /// Total number of files in the batch.
        total: usize,
        /// Name of the file that failed.
        filename: String,
        /// Underlying failure reason.
        reason: String,
        /// Number of files before this one that uploaded successfully.
        succeeded: usize,
    },

    /// An in-flight operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// Serialization or deserialization of a JSON payload failed outside the
    /// inbound-message path (e.g. building an outbound command).
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RtError {
    /// Best-effort classification into an [`ErrorSource`] for the `error` bus event.
    #[must_use]
    pub fn source_kind(&self) -> ErrorSource {
        match self {
            Self::AuthenticationRequired | Self::AuthenticationFailed { .. } => ErrorSource::Auth,
            Self::AlreadyConnecting
            | Self::ConnectionTimeout { .. }
            | Self::ConnectionFailed(_)
            | Self::NotConnected
            | Self::ConfigurationError(_) => ErrorSource::Connection,
            Self::MessageParseError(_) | Self::Serialization(_) => ErrorSource::MessageParser,
            Self::UploadValidation(_)
            | Self::UploadTransport(_)
            | Self::UploadResponseMalformed(_)
            | Self::BatchUploadFailed { .. } => ErrorSource::Upload,
            Self::Cancelled => ErrorSource::Connection,
        }
    }

    /// Whether this failure reason looks authentication-shaped, used to stop
    /// the reconnection policy instead of retrying a doomed connection.
    #[must_use]
    pub fn is_auth_shaped(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationRequired | Self::AuthenticationFailed { .. }
        )
    }
}

/// Convenience alias used throughout the SDK.
pub type RtResult<T> = Result<T, RtError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_are_auth_shaped() {
        assert!(RtError::AuthenticationRequired.is_auth_shaped());
        assert!(RtError::AuthenticationFailed {
            reason: "bad token".into()
        }
        .is_auth_shaped());
        assert!(!RtError::NotConnected.is_auth_shaped());
    }

    #[test]
    fn source_kind_groups_match_error_source() {
        assert_eq!(
            RtError::UploadValidation("too big".into()).source_kind(),
            ErrorSource::Upload
        );
        assert_eq!(RtError::NotConnected.source_kind(), ErrorSource::Connection);
        assert_eq!(
            RtError::MessageParseError("bad json".into()).source_kind(),
            ErrorSource::MessageParser
        );
    }

    #[test]
    fn batch_upload_failed_message_cites_index_filename_and_successes() {
        let err = RtError::BatchUploadFailed {
            index: 3,
            total: 5,
            filename: "clip.wav".into(),
            reason: "timeout".into(),
            succeeded: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("3/5"));
        assert!(msg.contains("clip.wav"));
        assert!(msg.contains("2 prior"));
    }

    #[test]
    fn error_source_display() {
        assert_eq!(ErrorSource::Auth.to_string(), "auth");
        assert_eq!(ErrorSource::MessageParser.to_string(), "message_parser");
    }
}
