//! The top-level orchestrator: URL construction, the connect/reconnect state
//! machine, inbound frame fan-out, the initialization barrier, identity
//! fan-out to the uploader, and typed client command wrappers.
//!
//! Shaped after `turbomcp-client::Client`'s orchestration: a
//! cheaply-`Clone`-able handle around one `Arc<Inner>` so transport
//! callbacks (plain, non-async `Fn` closures) can clone a handle and
//! `tokio::spawn` the async follow-up work they need to do.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, Notify, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use url::Url;

use rtagent_core::{websocket_scheme_for, ConnectionState, EventBus, ReconnectionPolicy, RtError, RtResult};
use rtagent_transport::{Inbound, TransportConfig, TransportHandlers, TransportTimeouts, WebSocketTransport};

use crate::auth::AuthProvider;
use crate::config::ClientConfig;
use crate::file_uploader::{FileUploader, UploadLimits};
use crate::messages::ClientCommand;
use crate::session_store::SessionStore;
use crate::stream_processor::StreamProcessor;

const WS_PATH: &str = "/api/rt/ws";

/// Events stashed into per-topic caches while waiting for the initialization
/// barrier to close. `chat_session_changed` also drives [`SessionStore`]
/// directly via [`StreamProcessor`]; it is tracked here only for the barrier.
const INIT_EVENTS: &[&str] = &[
    "chat_user_data",
    "avatar_list",
    "voice_list",
    "agent_list",
    "tool_catalog",
    "chat_session_changed",
];

/// Receives raw PCM16 audio frames arriving over the socket. The bus cannot
/// carry binary payloads efficiently (its events are `serde_json::Value`),
/// so this is a second, optional delivery path alongside the lightweight
/// `audio:output`/`binary_audio` marker events the bus still receives.
pub trait AudioSink: Send + Sync {
    /// Called once per inbound binary frame, in arrival order.
    fn on_audio_output(&self, data: &[u8]);
}

#[derive(Debug, Default)]
struct Identity {
    auth_token: Option<String>,
    ui_session_id: Option<String>,
    preferred_agent_key: Option<String>,
    current_chat_session_id: Option<String>,
    is_reconnecting: bool,
}

struct InitBarrier {
    chat_user_data: AtomicBool,
    avatar_list: AtomicBool,
    voice_list: AtomicBool,
    agent_list: AtomicBool,
    tool_catalog: AtomicBool,
    chat_session_changed: AtomicBool,
    initialized: AtomicBool,
    notify: Notify,
}

impl InitBarrier {
    fn new() -> Self {
        Self {
            chat_user_data: AtomicBool::new(false),
            avatar_list: AtomicBool::new(false),
            voice_list: AtomicBool::new(false),
            agent_list: AtomicBool::new(false),
            tool_catalog: AtomicBool::new(false),
            chat_session_changed: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Records an observation of `event_type`. Returns `true` exactly once:
    /// on the observation that completes the barrier.
    fn observe(&self, event_type: &str) -> bool {
        let flag = match event_type {
            "chat_user_data" => &self.chat_user_data,
            "avatar_list" => &self.avatar_list,
            "voice_list" => &self.voice_list,
            "agent_list" => &self.agent_list,
            "tool_catalog" => &self.tool_catalog,
            "chat_session_changed" => &self.chat_session_changed,
            _ => return false,
        };
        flag.store(true, Ordering::SeqCst);

        if self.initialized.load(Ordering::SeqCst) {
            return false;
        }
        let complete = self.chat_user_data.load(Ordering::SeqCst)
            && self.avatar_list.load(Ordering::SeqCst)
            && self.voice_list.load(Ordering::SeqCst)
            && self.agent_list.load(Ordering::SeqCst)
            && self.tool_catalog.load(Ordering::SeqCst)
            && self.chat_session_changed.load(Ordering::SeqCst);
        if complete {
            self.initialized.store(true, Ordering::SeqCst);
            self.notify.notify_waiters();
        }
        complete
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.chat_user_data.store(false, Ordering::SeqCst);
        self.avatar_list.store(false, Ordering::SeqCst);
        self.voice_list.store(false, Ordering::SeqCst);
        self.agent_list.store(false, Ordering::SeqCst);
        self.tool_catalog.store(false, Ordering::SeqCst);
        self.chat_session_changed.store(false, Ordering::SeqCst);
        self.initialized.store(false, Ordering::SeqCst);
    }

    async fn wait(&self) {
        if self.is_initialized() {
            return;
        }
        loop {
            let notified = self.notify.notified();
            if self.is_initialized() {
                return;
            }
            notified.await;
            if self.is_initialized() {
                return;
            }
        }
    }
}

struct Inner {
    config: ClientConfig,
    base_ws_url: Url,
    transport_template: TransportConfig,
    state: RwLock<ConnectionState>,
    transport: AsyncMutex<Option<WebSocketTransport>>,
    bus: Arc<EventBus>,
    stream_processor: Arc<StreamProcessor>,
    session_store: Arc<SessionStore>,
    file_uploader: Arc<FileUploader>,
    reconnection: ReconnectionPolicy,
    auth_provider: Option<Arc<dyn AuthProvider>>,
    audio_sink: Option<Arc<dyn AudioSink>>,
    identity: AsyncMutex<Identity>,
    init: InitBarrier,
}

/// The orchestrating handle applications hold: a cheap `Clone` wrapper
/// around one shared connection's state.
#[derive(Clone)]
pub struct ConnectionCore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ConnectionCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionCore").field("api_url", &self.inner.config.api_url).finish()
    }
}

impl ConnectionCore {
    /// Builds a not-yet-connected core from `config`, an optional
    /// [`AuthProvider`] collaborator, and an optional [`AudioSink`].
    ///
    /// # Errors
    /// Returns [`RtError::ConfigurationError`] if `config.api_url` is not a
    /// parsable URL with an `http(s)`/`ws(s)` scheme.
    pub fn new(
        config: ClientConfig,
        auth_provider: Option<Arc<dyn AuthProvider>>,
        audio_sink: Option<Arc<dyn AudioSink>>,
    ) -> RtResult<Self> {
        let base_ws_url = build_base_ws_url(&config.api_url)?;
        let bus = Arc::new(EventBus::new());
        let limits = UploadLimits {
            max_upload_size: config.max_upload_size,
            allowed_mime_types: config.allowed_mime_types.clone(),
            max_files_per_message: config.max_files_per_message,
        };
        let file_uploader = Arc::new(FileUploader::new(&base_ws_url, limits)?);
        file_uploader.set_auth_token(config.auth_token.clone());
        if let Some(ui_session_id) = config.ui_session_id.clone() {
            file_uploader.set_ui_session_id(Some(ui_session_id));
        }

        let identity = Identity {
            auth_token: config.auth_token.clone(),
            ui_session_id: config.ui_session_id.clone(),
            preferred_agent_key: config.preferred_agent_key.clone(),
            current_chat_session_id: None,
            is_reconnecting: false,
        };

        let transport_config = TransportConfig {
            url: base_ws_url.to_string(),
            protocols: config.protocols.clone(),
            headers: config.headers.clone().into_iter().collect(),
            timeouts: TransportTimeouts {
                connect_timeout: config.connection_timeout,
                ping_interval: config.ping_interval,
                pong_timeout: config.pong_timeout,
            },
            max_message_size: config.max_message_size,
        };

        let token_refresh_channel = auth_provider.as_ref().and_then(|p| p.token_refresh_channel());

        let inner = Arc::new(Inner {
            reconnection: ReconnectionPolicy::new(config.reconnection.clone(), bus.clone()),
            session_store: Arc::new(SessionStore::new(bus.clone(), config.max_cached_sessions)),
            stream_processor: Arc::new(StreamProcessor::new(bus.clone())),
            config,
            base_ws_url,
            transport_template: transport_config,
            state: RwLock::new(ConnectionState::Disconnected),
            transport: AsyncMutex::new(None),
            bus,
            file_uploader,
            auth_provider,
            audio_sink,
            identity: AsyncMutex::new(identity),
            init: InitBarrier::new(),
        });

        let core = Self { inner };
        if let Some(mut rx) = token_refresh_channel {
            let watcher = core.clone();
            tokio::spawn(async move {
                loop {
                    if rx.changed().await.is_err() {
                        break;
                    }
                    let token = rx.borrow_and_update().clone();
                    watcher.set_auth_token(Some(token)).await;
                }
            });
        }

        Ok(core)
    }

    /// The shared event bus applications subscribe to.
    #[must_use]
    pub fn bus(&self) -> Arc<EventBus> {
        self.inner.bus.clone()
    }

    /// The session index/current-session cache.
    #[must_use]
    pub fn session_store(&self) -> Arc<SessionStore> {
        self.inner.session_store.clone()
    }

    /// The current connection state.
    pub async fn connection_state(&self) -> ConnectionState {
        *self.inner.state.read().await
    }

    /// Whether all six initialization events have been observed since the
    /// last socket open.
    #[must_use]
    pub fn is_fully_initialized(&self) -> bool {
        self.inner.init.is_initialized()
    }

    /// Resolves immediately if already initialized, otherwise waits for the
    /// next `initialized` transition.
    pub async fn wait_for_initialization(&self) {
        self.inner.init.wait().await;
    }

    /// Opens the socket. Idempotent if already connected; fails fast if a
    /// connect attempt is already in flight.
    ///
    /// # Errors
    /// [`RtError::AlreadyConnecting`] if a connect is in flight,
    /// [`RtError::AuthenticationRequired`] if no token is available,
    /// [`RtError::ConnectionTimeout`]/[`RtError::ConnectionFailed`] if the
    /// socket fails to open.
    pub async fn connect(&self) -> RtResult<()> {
        {
            let state = *self.inner.state.read().await;
            if state == ConnectionState::Connected {
                return Ok(());
            }
            if state == ConnectionState::Connecting {
                return Err(RtError::AlreadyConnecting);
            }
        }

        let (token, ui_session_id) = self.resolve_auth().await;
        let Some(token) = token else {
            self.inner.bus.emit("error", &serde_json::json!({"message": "no auth token available", "source": "auth"}));
            return Err(RtError::AuthenticationRequired);
        };
        {
            let mut identity = self.inner.identity.lock().await;
            identity.auth_token = Some(token.clone());
            identity.ui_session_id = ui_session_id.clone();
        }
        self.inner.file_uploader.set_auth_token(Some(token));
        if let Some(ui_session_id) = ui_session_id {
            self.inner.file_uploader.set_ui_session_id(Some(ui_session_id));
        }

        *self.inner.state.write().await = ConnectionState::Connecting;

        let url = self.build_connect_url().await?;
        let handlers = self.build_transport_handlers();

        let mut transport_config = self.inner.transport_template.clone();
        transport_config.url = url.to_string();
        let mut socket = WebSocketTransport::new(transport_config);
        let result = socket.connect(handlers).await;

        match result {
            Ok(()) => {
                *self.inner.transport.lock().await = Some(socket);
                *self.inner.state.write().await = ConnectionState::Connected;
                self.inner.reconnection.reset();
                self.inner.bus.emit("connected", &Value::Null);
                Ok(())
            }
            Err(e) => {
                *self.inner.state.write().await = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Closes the socket, stops reconnection, and resets all per-connection
    /// state (accumulator, initialization barrier, `is_reconnecting`).
    pub async fn disconnect(&self) {
        self.inner.reconnection.stop();
        {
            let mut identity = self.inner.identity.lock().await;
            identity.is_reconnecting = false;
        }
        self.inner.stream_processor.reset_accumulator();
        self.inner.init.reset();
        if let Some(mut socket) = self.inner.transport.lock().await.take() {
            socket.disconnect(1000, "Client disconnect").await;
        }
        *self.inner.state.write().await = ConnectionState::Disconnected;
    }

    async fn resolve_auth(&self) -> (Option<String>, Option<String>) {
        let (mut token, mut ui_session_id) = {
            let identity = self.inner.identity.lock().await;
            (identity.auth_token.clone(), identity.ui_session_id.clone())
        };
        if let Some(provider) = &self.inner.auth_provider {
            if token.is_none() {
                token = provider.auth_token().await;
            }
            if ui_session_id.is_none() {
                ui_session_id = provider.ui_session_id().await;
            }
        }
        (token, ui_session_id)
    }

    async fn build_connect_url(&self) -> RtResult<Url> {
        let mut url = self.inner.base_ws_url.clone();
        let identity = self.inner.identity.lock().await;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.clear();
            if let Some(token) = &identity.auth_token {
                pairs.append_pair("token", token);
            }
            if let Some(ui_session_id) = &identity.ui_session_id {
                if !ui_session_id.is_empty() {
                    pairs.append_pair("ui_session_id", ui_session_id);
                }
            }
            if identity.is_reconnecting && identity.current_chat_session_id.is_some() {
                pairs.append_pair("chat_session_id", identity.current_chat_session_id.as_ref().unwrap());
            } else if let Some(agent_key) = &identity.preferred_agent_key {
                pairs.append_pair("agent_key", agent_key);
            }
        }
        Ok(url)
    }

    fn build_transport_handlers(&self) -> TransportHandlers {
        let on_message_core = self.clone();
        let on_close_core = self.clone();
        TransportHandlers {
            on_message: Arc::new(move |inbound| match inbound {
                Inbound::Text(text) => {
                    let core = on_message_core.clone();
                    tokio::spawn(async move { core.handle_text_frame(&text).await });
                }
                Inbound::Binary(data) => {
                    on_message_core.handle_binary_frame(&data);
                }
            }),
            on_close: Arc::new(move |code, reason| {
                let core = on_close_core.clone();
                tokio::spawn(async move { core.handle_close(code, reason).await });
            }),
        }
    }

    async fn handle_text_frame(&self, text: &str) {
        let payload: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                self.inner.bus.emit(
                    "error",
                    &serde_json::json!({"message": format!("failed to parse server message: {e}"), "source": "message_parser"}),
                );
                return;
            }
        };
        let Some(event_type) = payload.get("type").and_then(Value::as_str).map(str::to_string) else {
            self.inner.bus.emit(
                "error",
                &serde_json::json!({"message": "message has no \"type\" field", "source": "message_parser"}),
            );
            return;
        };

        match event_type.as_str() {
            "ping" => {
                let guard = self.inner.transport.lock().await;
                if let Some(socket) = guard.as_ref() {
                    if let Err(e) = socket.send_json(&serde_json::json!({"type": "pong"})).await {
                        warn!(error = %e, "failed to reply to ping");
                    }
                }
                return;
            }
            "pong" => return,
            _ => {}
        }

        if crate::stream_processor::is_whitelisted(&event_type) {
            self.inner.stream_processor.handle_event(&event_type, &payload, &self.inner.session_store);
            if event_type == "chat_session_changed" {
                let session_id = payload.get("session_id").and_then(Value::as_str).map(str::to_string);
                self.inner.identity.lock().await.current_chat_session_id = session_id;
            }
        } else {
            // `chat_session_name_changed`/`chat_session_deleted` are absorbed
            // into `SessionStore`, which emits its own named bus events for
            // them; raw-forwarding here as well would double-fire near-
            // identical events under the same name for name changes.
            let absorbed = self.apply_session_index_event(&event_type, &payload);
            if !absorbed {
                self.inner.bus.emit(&event_type, &payload);
            }
        }

        if self.inner.init.observe(&event_type) {
            self.inner.bus.emit("initialized", &Value::Null);
            let core = self.clone();
            tokio::spawn(async move { core.post_init_recovery().await });
        }
    }

    /// Keeps the session-index cache current from server events that are
    /// not part of the [`StreamProcessor`] whitelist but still describe the
    /// chat session index: a fresh page, a name change confirmed or pushed
    /// from another client, or a deletion initiated elsewhere.
    ///
    /// Returns `true` if this event was fully absorbed into [`SessionStore`]
    /// state under its own bus event name, so the caller should skip the
    /// generic raw re-emit to avoid double-firing the same event name.
    fn apply_session_index_event(&self, event_type: &str, payload: &Value) -> bool {
        match event_type {
            "get_user_sessions_response" => {
                let Some(entries) = payload.get("sessions").or_else(|| payload.get("entries")) else {
                    return false;
                };
                match serde_json::from_value::<Vec<rtagent_core::ChatSessionEntry>>(entries.clone()) {
                    Ok(parsed) => self.inner.session_store.apply_index_page(parsed),
                    Err(e) => warn!(error = %e, "failed to parse get_user_sessions_response entries"),
                }
                false
            }
            "chat_session_added" => {
                if let Ok(entry) = serde_json::from_value::<rtagent_core::ChatSessionEntry>(payload.clone()) {
                    self.inner.session_store.apply_index_page(vec![entry]);
                }
                false
            }
            "chat_session_name_changed" => {
                if let (Some(session_id), Some(name)) = (
                    payload.get("session_id").and_then(Value::as_str),
                    payload.get("session_name").or_else(|| payload.get("name")).and_then(Value::as_str),
                ) {
                    self.inner.session_store.update_session_name(session_id, name);
                    true
                } else {
                    false
                }
            }
            "chat_session_deleted" => {
                if let Some(session_id) = payload.get("session_id").and_then(Value::as_str) {
                    self.inner.session_store.delete_optimistic(session_id);
                }
                false
            }
            _ => false,
        }
    }

    fn handle_binary_frame(&self, data: &Bytes) {
        if let Some(sink) = &self.inner.audio_sink {
            sink.on_audio_output(data);
        }
        let marker = serde_json::json!({ "bytes": data.len() });
        self.inner.bus.emit("audio:output", &marker);
        self.inner.bus.emit("binary_audio", &marker);
    }

    async fn post_init_recovery(&self) {
        tokio::task::yield_now().await;

        let (is_reconnecting, has_session, preferred_agent_key) = {
            let identity = self.inner.identity.lock().await;
            (identity.is_reconnecting, identity.current_chat_session_id.is_some(), identity.preferred_agent_key.clone())
        };

        if is_reconnecting && has_session {
            // Server already resumed the session named in the connect URL.
        } else if let Some(agent_key) = preferred_agent_key {
            let guard = self.inner.transport.lock().await;
            if let Some(socket) = guard.as_ref() {
                let _ = socket.send_json(&ClientCommand::NewChatSession { agent_key: Some(agent_key) }).await;
            }
        }

        let mut identity = self.inner.identity.lock().await;
        identity.is_reconnecting = false;
    }

    async fn handle_close(&self, code: u16, reason: String) {
        let was_connected = *self.inner.state.read().await == ConnectionState::Connected;
        *self.inner.state.write().await = ConnectionState::Disconnected;
        self.inner.bus.emit("disconnected", &serde_json::json!({"code": code, "reason": reason}));

        if !was_connected || code == 1000 || !self.inner.config.auto_reconnect {
            return;
        }

        let (token_available, _) = self.resolve_auth().await;
        if token_available.is_none() {
            self.inner.bus.emit("error", &serde_json::json!({"message": "cannot reconnect: no auth token available", "source": "auth"}));
            return;
        }

        {
            let mut identity = self.inner.identity.lock().await;
            identity.is_reconnecting = true;
        }
        *self.inner.state.write().await = ConnectionState::Reconnecting;

        let core = self.clone();
        let bus = self.inner.bus.clone();
        tokio::spawn(async move {
            let result = core
                .inner
                .reconnection
                .start(move || {
                    let core = core.clone();
                    async move { core.connect().await }
                })
                .await;
            if let Err(e) = result {
                error!(error = %e, "reconnection exhausted");
                bus.emit("disconnected", &serde_json::json!({"code": 1006}));
            }
        });
    }

    /// Updates the auth token. Forwards to the uploader and, if currently
    /// connected, cycles the connection so the server sees the new token.
    pub async fn set_auth_token(&self, token: Option<String>) {
        {
            let mut identity = self.inner.identity.lock().await;
            identity.auth_token.clone_from(&token);
        }
        self.inner.file_uploader.set_auth_token(token);
        self.cycle_if_connected().await;
    }

    /// Updates `ui_session_id`. Forwarded to the uploader only when `Some`;
    /// cycles the connection if currently connected.
    pub async fn set_ui_session_id(&self, ui_session_id: Option<String>) {
        {
            let mut identity = self.inner.identity.lock().await;
            identity.ui_session_id.clone_from(&ui_session_id);
        }
        if let Some(ui_session_id) = ui_session_id {
            self.inner.file_uploader.set_ui_session_id(Some(ui_session_id));
        }
        self.cycle_if_connected().await;
    }

    /// Applies a server-pushed `ui_session_id_changed` event: updates the
    /// local copy and fans out to the uploader. Does not count toward the
    /// initialization barrier and does not cycle the connection (the server
    /// is telling us, not asking us to reconnect).
    pub async fn apply_ui_session_id_changed(&self, ui_session_id: String) {
        {
            let mut identity = self.inner.identity.lock().await;
            identity.ui_session_id = Some(ui_session_id.clone());
        }
        self.inner.file_uploader.set_ui_session_id(Some(ui_session_id.clone()));
        self.inner.bus.emit("ui_session_id_changed", &serde_json::json!({"ui_session_id": ui_session_id}));
    }

    async fn cycle_if_connected(&self) {
        if self.connection_state().await == ConnectionState::Connected {
            self.disconnect().await;
            let _ = self.connect().await;
        }
    }

    async fn send_command(&self, command: ClientCommand) -> RtResult<()> {
        if self.connection_state().await != ConnectionState::Connected {
            return Err(RtError::NotConnected);
        }
        let guard = self.inner.transport.lock().await;
        let socket = guard.as_ref().ok_or(RtError::NotConnected)?;
        socket.send_json(&command).await
    }

    /// Requests the agent catalog.
    pub async fn get_agents(&self) -> RtResult<()> {
        self.send_command(ClientCommand::GetAgents).await
    }

    /// Switches the active agent.
    pub async fn set_agent(&self, agent_key: impl Into<String>) -> RtResult<()> {
        self.send_command(ClientCommand::SetAgent { agent_key: agent_key.into() }).await
    }

    /// Requests the avatar catalog.
    pub async fn get_avatars(&self) -> RtResult<()> {
        self.send_command(ClientCommand::GetAvatars).await
    }

    /// Selects an avatar.
    pub async fn set_avatar(&self, avatar_id: impl Into<String>) -> RtResult<()> {
        self.send_command(ClientCommand::SetAvatar { avatar_id: avatar_id.into() }).await
    }

    /// Binds an avatar vendor session.
    pub async fn set_avatar_session(&self, avatar_session_id: impl Into<String>) -> RtResult<()> {
        self.send_command(ClientCommand::SetAvatarSession { avatar_session_id: avatar_session_id.into() }).await
    }

    /// Clears any avatar vendor session binding.
    pub async fn clear_avatar_session(&self) -> RtResult<()> {
        self.send_command(ClientCommand::ClearAvatarSession).await
    }

    /// Sets the current agent's voice.
    pub async fn set_agent_voice(&self, voice_id: impl Into<String>) -> RtResult<()> {
        self.send_command(ClientCommand::SetAgentVoice { voice_id: voice_id.into() }).await
    }

    /// Submits a user text turn, with optional file attachments by id.
    pub async fn text_input(&self, text: impl Into<String>, file_ids: Vec<String>) -> RtResult<()> {
        self.send_command(ClientCommand::text_input(text, file_ids)).await
    }

    /// Starts a brand-new chat session, clearing the current one and
    /// resetting the streaming accumulator.
    pub async fn new_chat_session(&self, agent_key: Option<String>) -> RtResult<()> {
        self.send_command(ClientCommand::NewChatSession { agent_key }).await?;
        self.inner.identity.lock().await.current_chat_session_id = None;
        self.inner.stream_processor.reset_accumulator();
        Ok(())
    }

    /// Resumes a previously created chat session by id, resetting the
    /// streaming accumulator.
    pub async fn resume_chat_session(&self, session_id: impl Into<String>) -> RtResult<()> {
        self.send_command(ClientCommand::ResumeChatSession { session_id: session_id.into() }).await?;
        self.inner.stream_processor.reset_accumulator();
        Ok(())
    }

    /// Renames the current chat session.
    pub async fn set_chat_session_name(&self, session_id: impl Into<String>, name: impl Into<String>) -> RtResult<()> {
        self.send_command(ClientCommand::SetChatSessionName { session_id: session_id.into(), name: name.into() }).await
    }

    /// Attaches arbitrary metadata to a chat session.
    pub async fn set_session_metadata(&self, session_id: impl Into<String>, metadata: Value) -> RtResult<()> {
        self.send_command(ClientCommand::SetSessionMetadata { session_id: session_id.into(), metadata }).await
    }

    /// Replaces a chat session's message history.
    pub async fn set_session_messages(&self, session_id: impl Into<String>, messages: Value) -> RtResult<()> {
        self.send_command(ClientCommand::SetSessionMessages { session_id: session_id.into(), messages }).await
    }

    /// Requests a page of the user's chat session index.
    pub async fn get_user_sessions(&self, offset: u32, limit: u32) -> RtResult<()> {
        self.send_command(ClientCommand::GetUserSessions { offset, limit }).await
    }

    /// Requests the voice catalog.
    pub async fn get_voices(&self) -> RtResult<()> {
        self.send_command(ClientCommand::GetVoices).await
    }

    /// Requests the tool catalog.
    pub async fn get_tool_catalog(&self) -> RtResult<()> {
        self.send_command(ClientCommand::GetToolCatalog).await
    }

    /// Sends a client-initiated liveness probe.
    pub async fn ping(&self) -> RtResult<()> {
        self.send_command(ClientCommand::Ping).await
    }

    /// Advisory request that the server cancel the in-flight response. The
    /// server remains authoritative; the SDK truncates locally only once it
    /// observes `cancelled` on the bus.
    pub async fn client_wants_cancel(&self) -> RtResult<()> {
        if self.inner.config.debug {
            let before = self.inner.transport.lock().await.as_ref().map(WebSocketTransport::buffered_amount).unwrap_or(0);
            debug!(buffered_amount = before, "client_wants_cancel: buffered amount before send");
            self.send_command(ClientCommand::ClientWantsCancel).await?;
            let after = self.inner.transport.lock().await.as_ref().map(WebSocketTransport::buffered_amount).unwrap_or(0);
            debug!(buffered_amount = after, "client_wants_cancel: buffered amount after send");
            Ok(())
        } else {
            self.send_command(ClientCommand::ClientWantsCancel).await
        }
    }

    /// Sends raw bytes as a binary frame, verbatim, never wrapped in JSON.
    ///
    /// # Errors
    /// [`RtError::NotConnected`] if the socket is not open.
    pub async fn send_binary_frame(&self, data: Bytes) -> RtResult<()> {
        if self.connection_state().await != ConnectionState::Connected {
            return Err(RtError::NotConnected);
        }
        let guard = self.inner.transport.lock().await;
        let socket = guard.as_ref().ok_or(RtError::NotConnected)?;
        socket.send_binary(data).await
    }

    /// Uploads a single file via the independent HTTP file uploader.
    pub async fn upload_file(
        &self,
        file: crate::file_uploader::UploadFile,
        cancel: CancellationToken,
        on_progress: impl Fn(crate::file_uploader::UploadProgress) + Send + Sync + 'static,
    ) -> RtResult<crate::file_uploader::UploadedFile> {
        self.inner.file_uploader.upload_file(file, cancel, on_progress).await
    }

    /// Uploads a batch of files sequentially via the independent HTTP file uploader.
    pub async fn upload_files(
        &self,
        files: Vec<crate::file_uploader::UploadFile>,
        cancel: CancellationToken,
        on_progress: impl Fn(crate::file_uploader::UploadProgress) + Send + Sync + 'static,
    ) -> RtResult<Vec<crate::file_uploader::UploadedFile>> {
        self.inner.file_uploader.upload_files(files, cancel, on_progress).await
    }
}

fn build_base_ws_url(api_url: &str) -> RtResult<Url> {
    let mut url = Url::parse(api_url).map_err(|e| RtError::ConfigurationError(format!("invalid api_url {api_url:?}: {e}")))?;
    let ws_scheme = websocket_scheme_for(url.scheme())
        .ok_or_else(|| RtError::ConfigurationError(format!("unsupported api_url scheme {:?}", url.scheme())))?;
    url.set_scheme(ws_scheme).map_err(|()| RtError::ConfigurationError("failed to set websocket scheme".into()))?;
    url.set_path(WS_PATH);
    url.set_query(None);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api_url: &str) -> ClientConfig {
        ClientConfig::new(api_url)
    }

    #[test]
    fn base_ws_url_coerces_https_to_wss_and_sets_path() {
        let url = build_base_ws_url("https://agents.example.com/ignored").unwrap();
        assert_eq!(url.as_str(), "wss://agents.example.com/api/rt/ws");
    }

    #[test]
    fn base_ws_url_rejects_unsupported_scheme() {
        let err = build_base_ws_url("ftp://agents.example.com").unwrap_err();
        assert!(matches!(err, RtError::ConfigurationError(_)));
    }

    #[tokio::test]
    async fn fresh_core_is_disconnected_and_not_initialized() {
        let core = ConnectionCore::new(config("wss://agents.example.com"), None, None).unwrap();
        assert_eq!(core.connection_state().await, ConnectionState::Disconnected);
        assert!(!core.is_fully_initialized());
    }

    #[tokio::test]
    async fn connect_without_token_emits_auth_error_and_fails() {
        let core = ConnectionCore::new(config("wss://agents.example.com"), None, None).unwrap();
        let seen = Arc::new(AsyncMutex::new(false));
        let seen2 = seen.clone();
        core.bus().on("error", move |payload| {
            let source = payload.get("source").and_then(Value::as_str);
            if source == Some("auth") {
                if let Ok(mut guard) = seen2.try_lock() {
                    *guard = true;
                }
            }
        });
        let err = core.connect().await.unwrap_err();
        assert!(matches!(err, RtError::AuthenticationRequired));
        assert!(*seen.lock().await);
    }

    #[tokio::test]
    async fn init_barrier_completes_after_six_events() {
        let mut cfg = config("wss://agents.example.com");
        cfg.auth_token = Some("tok".into());
        let core = ConnectionCore::new(cfg, None, None).unwrap();
        assert!(!core.is_fully_initialized());
        for event in INIT_EVENTS {
            let completed = core.inner.init.observe(event);
            if *event == "chat_session_changed" {
                assert!(completed);
            } else {
                assert!(!completed);
            }
        }
        assert!(core.is_fully_initialized());
    }

    #[tokio::test]
    async fn build_connect_url_never_carries_both_chat_session_and_agent_key() {
        let mut cfg = config("wss://agents.example.com");
        cfg.auth_token = Some("tok".into());
        cfg.preferred_agent_key = Some("agent-1".into());
        let core = ConnectionCore::new(cfg, None, None).unwrap();
        {
            let mut identity = core.inner.identity.lock().await;
            identity.is_reconnecting = true;
            identity.current_chat_session_id = Some("session-1".into());
        }
        let url = core.build_connect_url().await.unwrap();
        let query: std::collections::HashMap<_, _> = url.query_pairs().collect();
        assert!(query.contains_key("chat_session_id"));
        assert!(!query.contains_key("agent_key"));
    }

    #[tokio::test]
    async fn build_connect_url_uses_agent_key_when_not_reconnecting() {
        let mut cfg = config("wss://agents.example.com");
        cfg.auth_token = Some("tok".into());
        cfg.preferred_agent_key = Some("agent-1".into());
        let core = ConnectionCore::new(cfg, None, None).unwrap();
        let url = core.build_connect_url().await.unwrap();
        let query: std::collections::HashMap<_, _> = url.query_pairs().collect();
        assert!(query.contains_key("agent_key"));
        assert!(!query.contains_key("chat_session_id"));
    }

    #[tokio::test]
    async fn get_user_sessions_response_populates_session_index_cache() {
        let mut cfg = config("wss://agents.example.com");
        cfg.auth_token = Some("tok".into());
        let core = ConnectionCore::new(cfg, None, None).unwrap();
        core.handle_text_frame(
            r#"{"type":"get_user_sessions_response","sessions":[{"session_id":"s1","session_name":"First","created_at":"2026-01-01T00:00:00Z","updated_at":null,"user_id":"u1","agent_key":null,"agent_name":null}]}"#,
        )
        .await;
        let snapshot = core.session_store().index_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].session_id, "s1");
    }

    #[tokio::test]
    async fn inbound_chat_session_changed_updates_identity_for_future_reconnects() {
        let mut cfg = config("wss://agents.example.com");
        cfg.auth_token = Some("tok".into());
        let core = ConnectionCore::new(cfg, None, None).unwrap();
        core.handle_text_frame(r#"{"type":"chat_session_changed","session_id":"sess-99"}"#).await;
        let identity = core.inner.identity.lock().await;
        assert_eq!(identity.current_chat_session_id.as_deref(), Some("sess-99"));
    }
}
