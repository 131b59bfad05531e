//! A single owned WebSocket connection with text/binary framing and
//! heartbeat-based liveness checking.
//!
//! Shaped after a single-consumer reader task plus a `spawn_keep_alive_task`
//! style heartbeat: one background task owns the read half and fans frames
//! out through callbacks, a second owns the ping/liveness clock, both torn
//! down via a broadcast shutdown signal when the transport is dropped or
//! `disconnect()`d.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use rtagent_core::{ConnectionState, RtError, RtResult};

use crate::config::TransportConfig;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = futures_util::stream::SplitSink<WsStream, Message>;
type WsReader = futures_util::stream::SplitStream<WsStream>;

/// A decoded inbound frame handed to the transport's message callback.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// A UTF-8 text frame (JSON, by convention of this SDK).
    Text(String),
    /// A binary frame (raw PCM16 audio, by convention of this SDK).
    Binary(Bytes),
}

/// Callbacks a transport consumer supplies to `connect()`.
///
/// Both callbacks are invoked synchronously from the reader task; they must
/// not block. Consumers that need to do async work should spawn a task.
#[derive(Clone)]
pub struct TransportHandlers {
    /// Called once per inbound frame, in arrival order.
    pub on_message: Arc<dyn Fn(Inbound) + Send + Sync>,
    /// Called once when the read loop ends, with the close code/reason if
    /// the server sent one.
    pub on_close: Arc<dyn Fn(u16, String) + Send + Sync>,
}

/// Owns one WebSocket connection: framing, heartbeat, and outbound send.
///
/// Only one socket is ever open per instance. Calling `connect()` while
/// already connected first calls `disconnect()`.
pub struct WebSocketTransport {
    config: TransportConfig,
    state: Arc<RwLock<ConnectionState>>,
    writer: Arc<Mutex<Option<WsWriter>>>,
    is_alive: Arc<AtomicBool>,
    buffered_amount: Arc<AtomicUsize>,
    shutdown: Option<broadcast::Sender<()>>,
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("url", &self.config.url)
            .field("buffered_amount", &self.buffered_amount.load(Ordering::Relaxed))
            .finish()
    }
}

impl WebSocketTransport {
    /// Creates a transport bound to `config`, not yet connected.
    #[must_use]
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            writer: Arc::new(Mutex::new(None)),
            is_alive: Arc::new(AtomicBool::new(false)),
            buffered_amount: Arc::new(AtomicUsize::new(0)),
            shutdown: None,
        }
    }

    /// Current connection state.
    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Approximate number of bytes queued for send but not yet flushed to
    /// the OS socket. Native sockets expose no byte-accurate equivalent of a
    /// browser's `bufferedAmount`; this counts outstanding `send` calls that
    /// have not yet completed their `feed`+`flush`.
    pub fn buffered_amount(&self) -> usize {
        self.buffered_amount.load(Ordering::Relaxed)
    }

    /// Opens the socket, spawning the reader and (if configured) heartbeat
    /// tasks. If a socket is already open, it is closed first.
    ///
    /// # Errors
    /// Returns [`RtError::ConnectionTimeout`] if the handshake does not
    /// finish before `timeouts.connect_timeout`, or
    /// [`RtError::ConnectionFailed`] for any other handshake failure.
    pub async fn connect(&mut self, handlers: TransportHandlers) -> RtResult<()> {
        if self.connection_state().await != ConnectionState::Disconnected {
            self.disconnect(1000, "reconnecting").await;
        }
        *self.state.write().await = ConnectionState::Connecting;

        let mut request = self
            .config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| RtError::ConfigurationError(e.to_string()))?;
        for (name, value) in &self.config.headers {
            let header_name = tokio_tungstenite::tungstenite::http::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| RtError::ConfigurationError(e.to_string()))?;
            let header_value = tokio_tungstenite::tungstenite::http::HeaderValue::from_str(value)
                .map_err(|e| RtError::ConfigurationError(e.to_string()))?;
            request.headers_mut().insert(header_name, header_value);
        }

        let connect_fut = tokio_tungstenite::connect_async(request);
        let elapsed_budget = self.config.timeouts.connect_timeout;
        let (stream, _response) = match tokio::time::timeout(elapsed_budget, connect_fut).await {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(RtError::ConnectionFailed(e.to_string()));
            }
            Err(_) => {
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(RtError::ConnectionTimeout {
                    elapsed_ms: elapsed_budget.as_millis() as u64,
                });
            }
        };

        let (sink, stream) = stream.split();
        *self.writer.lock().await = Some(sink);
        self.is_alive.store(true, Ordering::SeqCst);
        *self.state.write().await = ConnectionState::Connected;

        let (shutdown_tx, _) = broadcast::channel(4);
        self.shutdown = Some(shutdown_tx.clone());

        spawn_reader_task(
            stream,
            handlers,
            self.state.clone(),
            self.is_alive.clone(),
            shutdown_tx.subscribe(),
        );

        if let Some(ping_interval) = self.config.timeouts.ping_interval {
            spawn_heartbeat_task(
                ping_interval,
                self.config.timeouts.pong_timeout,
                self.writer.clone(),
                self.is_alive.clone(),
                self.state.clone(),
                shutdown_tx.subscribe(),
            );
        }

        Ok(())
    }

    /// Closes the socket (if open) with `code`/`reason`, and tears down the
    /// reader and heartbeat tasks. Idempotent; safe to call when already
    /// disconnected.
    pub async fn disconnect(&mut self, code: u16, reason: &str) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let mut guard = self.writer.lock().await;
        if let Some(mut writer) = guard.take() {
            let frame = CloseFrame {
                code: CloseCode::from(code),
                reason: reason.to_string().into(),
            };
            let _ = writer.send(Message::Close(Some(frame))).await;
            let _ = writer.close().await;
        }
        drop(guard);
        *self.state.write().await = ConnectionState::Disconnected;
        self.buffered_amount.store(0, Ordering::SeqCst);
    }

    /// Sends a raw [`Message`]. Returns [`RtError::NotConnected`] if no
    /// socket is open.
    pub async fn send(&self, message: Message) -> RtResult<()> {
        let approx_len = match &message {
            Message::Text(t) => t.len(),
            Message::Binary(b) => b.len(),
            _ => 0,
        };
        self.buffered_amount.fetch_add(approx_len, Ordering::SeqCst);
        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            self.buffered_amount.fetch_sub(approx_len, Ordering::SeqCst);
            return Err(RtError::NotConnected);
        };
        let result = writer.send(message).await;
        self.buffered_amount.fetch_sub(approx_len, Ordering::SeqCst);
        result.map_err(|e| RtError::ConnectionFailed(e.to_string()))
    }

    /// Serializes `value` as JSON and sends it as a text frame.
    pub async fn send_json(&self, value: &impl Serialize) -> RtResult<()> {
        let text = serde_json::to_string(value)?;
        self.send(Message::Text(text.into())).await
    }

    /// Sends raw bytes as a binary frame, verbatim, never wrapped in JSON.
    pub async fn send_binary(&self, data: Bytes) -> RtResult<()> {
        self.send(Message::Binary(data)).await
    }
}

use tokio_tungstenite::tungstenite::client::IntoClientRequest;

fn spawn_reader_task(
    mut stream: WsReader,
    handlers: TransportHandlers,
    state: Arc<RwLock<ConnectionState>>,
    is_alive: Arc<AtomicBool>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    tokio::spawn(async move {
        let mut close_code = 1000u16;
        let mut close_reason = String::new();
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::debug!("transport reader task received shutdown signal");
                    break;
                }
                frame = stream.next() => {
                    match frame {
                        Some(Ok(message)) => {
                            is_alive.store(true, Ordering::SeqCst);
                            match message {
                                Message::Text(text) => (handlers.on_message)(Inbound::Text(text.to_string())),
                                Message::Binary(data) => (handlers.on_message)(Inbound::Binary(Bytes::from(data))),
                                Message::Ping(_) | Message::Pong(_) => {}
                                Message::Close(frame) => {
                                    if let Some(frame) = frame {
                                        close_code = frame.code.into();
                                        close_reason = frame.reason.to_string();
                                    }
                                    break;
                                }
                                Message::Frame(_) => {}
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "transport reader task saw a stream error");
                            close_code = 1006;
                            close_reason = e.to_string();
                            break;
                        }
                        None => {
                            close_code = 1006;
                            close_reason = "stream ended".to_string();
                            break;
                        }
                    }
                }
            }
        }
        *state.write().await = ConnectionState::Disconnected;
        (handlers.on_close)(close_code, close_reason);
    });
}

fn spawn_heartbeat_task(
    ping_interval: std::time::Duration,
    pong_timeout: std::time::Duration,
    writer: Arc<Mutex<Option<WsWriter>>>,
    is_alive: Arc<AtomicBool>,
    state: Arc<RwLock<ConnectionState>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ping_interval);
        ticker.tick().await; // first tick fires immediately; consume it
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::debug!("heartbeat task received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    if !is_alive.swap(false, Ordering::SeqCst) {
                        tracing::warn!(timeout_ms = pong_timeout.as_millis(), "ping timeout: no frame observed since last ping");
                        let mut guard = writer.lock().await;
                        if let Some(mut w) = guard.take() {
                            let frame = CloseFrame {
                                code: CloseCode::from(4000u16),
                                reason: "Ping timeout".into(),
                            };
                            let _ = w.send(Message::Close(Some(frame))).await;
                        }
                        *state.write().await = ConnectionState::Disconnected;
                        break;
                    }
                    let mut guard = writer.lock().await;
                    if let Some(w) = guard.as_mut() {
                        if w.send(Message::Ping(Bytes::new())).await.is_err() {
                            break;
                        }
                    } else {
                        break;
                    }
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_config_default_max_message_size_is_64mib() {
        let config = TransportConfig::new("wss://example.test/api/rt/ws");
        assert_eq!(config.max_message_size, 64 * 1024 * 1024);
    }

    #[tokio::test]
    async fn send_without_connecting_returns_not_connected() {
        let transport = WebSocketTransport::new(TransportConfig::new("wss://example.test/api/rt/ws"));
        let result = transport.send_json(&serde_json::json!({"type": "ping"})).await;
        assert!(matches!(result, Err(RtError::NotConnected)));
    }

    #[tokio::test]
    async fn fresh_transport_is_disconnected() {
        let transport = WebSocketTransport::new(TransportConfig::new("wss://example.test/api/rt/ws"));
        assert_eq!(transport.connection_state().await, ConnectionState::Disconnected);
        assert_eq!(transport.buffered_amount(), 0);
    }
}
