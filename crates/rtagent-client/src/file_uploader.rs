//! Multipart HTTP upload of files alongside the realtime socket.
//!
//! Generalized from `turbomcp-client`'s use of `reqwest` for LLM-provider
//! HTTP calls into a streaming multipart POST with progress reporting. The
//! upload endpoint is derived from the WebSocket URL via
//! [`rtagent_core::http_scheme_for`] so the two never drift apart.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use rtagent_core::{http_scheme_for, RtError, RtResult};

const UPLOAD_PATH: &str = "/api/rt/upload_file";
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// One file to upload: raw bytes plus the metadata the server and MIME/size
/// validation need.
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// Display filename sent to the server.
    pub filename: String,
    /// MIME type sent as the multipart part's content type.
    pub mime_type: String,
    /// File contents.
    pub bytes: Bytes,
}

impl UploadFile {
    /// Wraps raw bytes with the metadata an upload needs.
    #[must_use]
    pub fn new(filename: impl Into<String>, mime_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }
}

/// Upload progress, reported via a `tokio::sync::mpsc` channel as bytes
/// stream to the server.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UploadProgress {
    /// Bytes sent so far.
    pub loaded: u64,
    /// Total bytes to send (the file size, or the whole-batch estimate).
    pub total: u64,
    /// `loaded / total * 100`, saturating at 100.
    pub percentage: f64,
}

impl UploadProgress {
    fn new(loaded: u64, total: u64) -> Self {
        let percentage = if total == 0 { 100.0 } else { (loaded as f64 / total as f64 * 100.0).min(100.0) };
        Self { loaded, total, percentage }
    }
}

/// Server response on a successful upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadedFile {
    /// Server-assigned file id, referenced by `ClientCommand::text_input`'s `file_ids`.
    pub id: String,
    /// Filename as stored by the server (may differ from what was sent).
    pub filename: String,
    /// MIME type as recorded by the server.
    pub mime_type: String,
    /// Size in bytes as recorded by the server.
    pub size: u64,
}

/// Validation limits consulted before any network I/O.
#[derive(Debug, Clone)]
pub struct UploadLimits {
    /// Largest single file accepted, in bytes.
    pub max_upload_size: u64,
    /// If non-empty, the only MIME types accepted.
    pub allowed_mime_types: Vec<String>,
    /// Largest batch `upload_files` will accept.
    pub max_files_per_message: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_upload_size: 25 * 1024 * 1024,
            allowed_mime_types: Vec::new(),
            max_files_per_message: 10,
        }
    }
}

#[derive(Debug, Default)]
struct Identity {
    auth_token: Option<String>,
    ui_session_id: Option<String>,
}

/// Uploads files over HTTP, independent of the WebSocket's lifecycle.
/// Observes auth token / ui_session_id changes via explicit setters; each
/// upload call snapshots identity at entry, so in-flight uploads are never
/// mutated mid-request.
pub struct FileUploader {
    client: reqwest::Client,
    upload_url: Url,
    limits: UploadLimits,
    identity: Mutex<Identity>,
}

impl std::fmt::Debug for FileUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileUploader").field("upload_url", &self.upload_url.as_str()).finish()
    }
}

impl FileUploader {
    /// Derives the upload endpoint from a WebSocket URL (`ws`/`wss` host,
    /// any path) and builds the uploader.
    pub fn new(websocket_url: &Url, limits: UploadLimits) -> RtResult<Self> {
        let upload_url = derive_upload_url(websocket_url)?;
        let client = reqwest::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|e| RtError::ConfigurationError(format!("failed to build upload HTTP client: {e}")))?;
        Ok(Self {
            client,
            upload_url,
            limits,
            identity: Mutex::new(Identity::default()),
        })
    }

    /// Updates the bearer token used by subsequent uploads.
    pub fn set_auth_token(&self, token: Option<String>) {
        self.identity.lock().expect("file uploader lock poisoned").auth_token = token;
    }

    /// Updates the `ui_session_id` form field used by subsequent uploads.
    /// Forwarding a `None` here clears it; callers that must not clear an
    /// existing value should only call this when they have `Some`.
    pub fn set_ui_session_id(&self, ui_session_id: Option<String>) {
        self.identity.lock().expect("file uploader lock poisoned").ui_session_id = ui_session_id;
    }

    fn snapshot_identity(&self) -> Identity {
        let identity = self.identity.lock().expect("file uploader lock poisoned");
        Identity {
            auth_token: identity.auth_token.clone(),
            ui_session_id: identity.ui_session_id.clone(),
        }
    }

    fn validate(&self, file: &UploadFile, identity: &Identity) -> RtResult<()> {
        if identity.auth_token.is_none() {
            return Err(RtError::UploadValidation("no auth token set".into()));
        }
        if identity.ui_session_id.is_none() {
            return Err(RtError::UploadValidation("no ui_session_id set".into()));
        }
        if file.bytes.len() as u64 > self.limits.max_upload_size {
            return Err(RtError::UploadValidation(format!(
                "file {:?} ({} bytes) exceeds maximum upload size of {} bytes",
                file.filename,
                file.bytes.len(),
                self.limits.max_upload_size
            )));
        }
        if !self.limits.allowed_mime_types.is_empty() && !self.limits.allowed_mime_types.contains(&file.mime_type) {
            return Err(RtError::UploadValidation(format!(
                "mime type {:?} is not in the allowed list for file {:?}",
                file.mime_type, file.filename
            )));
        }
        Ok(())
    }

    /// Uploads one file, honoring `cancel` both before and during the
    /// request, and reporting progress via `on_progress`.
    pub async fn upload_file(
        &self,
        file: UploadFile,
        cancel: CancellationToken,
        on_progress: impl Fn(UploadProgress) + Send + Sync + 'static,
    ) -> RtResult<UploadedFile> {
        if cancel.is_cancelled() {
            return Err(RtError::Cancelled);
        }
        let identity = self.snapshot_identity();
        self.validate(&file, &identity)?;

        let total = file.bytes.len() as u64;
        let loaded = Arc::new(AtomicU64::new(0));
        let on_progress = Arc::new(on_progress);
        let body_stream = counting_stream(file.bytes.clone(), loaded.clone(), total, on_progress.clone());
        let part = reqwest::multipart::Part::stream_with_length(reqwest::Body::wrap_stream(body_stream), total)
            .file_name(file.filename.clone())
            .mime_str(&file.mime_type)
            .map_err(|e| RtError::UploadValidation(format!("invalid mime type {:?}: {e}", file.mime_type)))?;

        let form = reqwest::multipart::Form::new()
            .text("ui_session_id", identity.ui_session_id.clone().unwrap_or_default())
            .part("file", part);

        let request = self
            .client
            .post(self.upload_url.clone())
            .bearer_auth(identity.auth_token.clone().unwrap_or_default())
            .multipart(form);

        let response = tokio::select! {
            () = cancel.cancelled() => {
                debug!(filename = %file.filename, "upload cancelled before response");
                return Err(RtError::Cancelled);
            }
            result = request.send() => result,
        };

        let response = response.map_err(|e| {
            if e.is_timeout() {
                RtError::UploadTransport(format!("upload of {:?} timed out", file.filename))
            } else {
                RtError::UploadTransport(format!("upload of {:?} failed: {e}", file.filename))
            }
        })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| {
                    v.get("error")
                        .or_else(|| v.get("message"))
                        .and_then(|m| m.as_str())
                        .map(str::to_string)
                })
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("upload failed").to_string());
            return Err(RtError::UploadTransport(message));
        }

        serde_json::from_str::<UploadedFile>(&body)
            .map_err(|e| RtError::UploadResponseMalformed(format!("{e}: {body}")))
    }

    /// Uploads files sequentially, reporting aggregated progress across the
    /// whole batch. Returns `Err(RtError::BatchUploadFailed)` citing the
    /// failing file's index/name and the count of prior successes; those
    /// prior successes are not rolled back.
    pub async fn upload_files(
        &self,
        files: Vec<UploadFile>,
        cancel: CancellationToken,
        on_progress: impl Fn(UploadProgress) + Send + Sync + 'static,
    ) -> RtResult<Vec<UploadedFile>> {
        if files.len() > self.limits.max_files_per_message {
            return Err(RtError::UploadValidation(format!(
                "Cannot upload {} files: maximum per message is {}",
                files.len(),
                self.limits.max_files_per_message
            )));
        }
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let total_files = files.len();
        let on_progress = Arc::new(on_progress);
        let mut uploaded = Vec::with_capacity(total_files);

        for (index, file) in files.into_iter().enumerate() {
            let filename = file.filename.clone();
            let completed = index;
            let on_progress_inner = on_progress.clone();
            let result = self
                .upload_file(file, cancel.clone(), move |file_progress| {
                    let overall = (completed as f64 + file_progress.percentage / 100.0) / total_files as f64 * 100.0;
                    on_progress_inner(UploadProgress {
                        loaded: overall.round() as u64,
                        total: 100,
                        percentage: overall,
                    });
                })
                .await;

            match result {
                Ok(uploaded_file) => uploaded.push(uploaded_file),
                Err(err) => {
                    return Err(RtError::BatchUploadFailed {
                        index: index + 1,
                        total: total_files,
                        filename,
                        reason: err.to_string(),
                        succeeded: uploaded.len(),
                    });
                }
            }
        }

        Ok(uploaded)
    }
}

fn counting_stream(
    bytes: Bytes,
    loaded: Arc<AtomicU64>,
    total: u64,
    on_progress: Arc<impl Fn(UploadProgress) + Send + Sync + 'static>,
) -> impl futures_util::Stream<Item = Result<Bytes, std::io::Error>> {
    const CHUNK_SIZE: usize = 64 * 1024;
    stream::unfold(0usize, move |offset| {
        let bytes = bytes.clone();
        let loaded = loaded.clone();
        let on_progress = on_progress.clone();
        async move {
            if offset >= bytes.len() {
                return None;
            }
            let end = (offset + CHUNK_SIZE).min(bytes.len());
            let chunk = bytes.slice(offset..end);
            let now_loaded = loaded.fetch_add(chunk.len() as u64, Ordering::Relaxed) + chunk.len() as u64;
            on_progress(UploadProgress::new(now_loaded, total));
            Some((Ok(chunk), end))
        }
    })
}

fn derive_upload_url(websocket_url: &Url) -> RtResult<Url> {
    let scheme = http_scheme_for(websocket_url.scheme())
        .ok_or_else(|| RtError::ConfigurationError(format!("cannot derive upload URL from scheme {:?}", websocket_url.scheme())))?;
    let mut url = websocket_url.clone();
    url.set_scheme(scheme)
        .map_err(|()| RtError::ConfigurationError("failed to set upload URL scheme".into()))?;
    url.set_query(None);
    url.set_path(UPLOAD_PATH);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uploader(url: &str) -> FileUploader {
        FileUploader::new(&Url::parse(url).unwrap(), UploadLimits::default()).unwrap()
    }

    #[test]
    fn derive_upload_url_converts_wss_to_https() {
        let url = derive_upload_url(&Url::parse("wss://agents.example.com/api/rt/ws?token=abc").unwrap()).unwrap();
        assert_eq!(url.as_str(), "https://agents.example.com/api/rt/upload_file");
    }

    #[test]
    fn derive_upload_url_converts_ws_to_http() {
        let url = derive_upload_url(&Url::parse("ws://localhost:8080/api/rt/ws").unwrap()).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/rt/upload_file");
    }

    #[tokio::test]
    async fn upload_without_token_fails_before_network() {
        let uploader = uploader("wss://agents.example.com/api/rt/ws");
        uploader.set_ui_session_id(Some("ui-1".into()));
        let file = UploadFile::new("a.txt", "text/plain", Bytes::from_static(b"hi"));
        let err = uploader.upload_file(file, CancellationToken::new(), |_| {}).await.unwrap_err();
        assert!(matches!(err, RtError::UploadValidation(_)));
    }

    #[tokio::test]
    async fn upload_over_size_limit_fails_before_network() {
        let uploader = FileUploader::new(
            &Url::parse("wss://agents.example.com/api/rt/ws").unwrap(),
            UploadLimits { max_upload_size: 1, ..UploadLimits::default() },
        )
        .unwrap();
        uploader.set_auth_token(Some("tok".into()));
        uploader.set_ui_session_id(Some("ui-1".into()));
        let file = UploadFile::new("a.txt", "text/plain", Bytes::from_static(b"too big"));
        let err = uploader.upload_file(file, CancellationToken::new(), |_| {}).await.unwrap_err();
        assert!(matches!(err, RtError::UploadValidation(_)));
    }

    #[tokio::test]
    async fn upload_rejected_mime_type_fails_before_network() {
        let uploader = FileUploader::new(
            &Url::parse("wss://agents.example.com/api/rt/ws").unwrap(),
            UploadLimits { allowed_mime_types: vec!["image/png".into()], ..UploadLimits::default() },
        )
        .unwrap();
        uploader.set_auth_token(Some("tok".into()));
        uploader.set_ui_session_id(Some("ui-1".into()));
        let file = UploadFile::new("a.txt", "text/plain", Bytes::from_static(b"hi"));
        let err = uploader.upload_file(file, CancellationToken::new(), |_| {}).await.unwrap_err();
        assert!(matches!(err, RtError::UploadValidation(_)));
    }

    #[tokio::test]
    async fn cancelled_before_flight_returns_cancelled_error() {
        let uploader = uploader("wss://agents.example.com/api/rt/ws");
        uploader.set_auth_token(Some("tok".into()));
        uploader.set_ui_session_id(Some("ui-1".into()));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let file = UploadFile::new("a.txt", "text/plain", Bytes::from_static(b"hi"));
        let err = uploader.upload_file(file, cancel, |_| {}).await.unwrap_err();
        assert!(matches!(err, RtError::Cancelled));
    }

    #[tokio::test]
    async fn empty_batch_resolves_to_empty_vec() {
        let uploader = uploader("wss://agents.example.com/api/rt/ws");
        let uploaded = uploader.upload_files(vec![], CancellationToken::new(), |_| {}).await.unwrap();
        assert!(uploaded.is_empty());
    }

    #[tokio::test]
    async fn batch_over_max_files_fails_before_any_upload() {
        let uploader = FileUploader::new(
            &Url::parse("wss://agents.example.com/api/rt/ws").unwrap(),
            UploadLimits { max_files_per_message: 1, ..UploadLimits::default() },
        )
        .unwrap();
        let files = vec![
            UploadFile::new("a.txt", "text/plain", Bytes::from_static(b"a")),
            UploadFile::new("b.txt", "text/plain", Bytes::from_static(b"b")),
        ];
        let err = uploader.upload_files(files, CancellationToken::new(), |_| {}).await.unwrap_err();
        assert!(matches!(err, RtError::UploadValidation(_)));
    }
}
