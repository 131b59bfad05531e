//! Exercises `WebSocketTransport` against a real, in-process
//! `tokio-tungstenite` server rather than mocked internals.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::Message;

use rtagent_core::ConnectionState;
use rtagent_transport::{Inbound, TransportConfig, TransportHandlers, WebSocketTransport};

async fn echo_server() -> (String, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                match msg {
                    Message::Close(_) => break,
                    Message::Ping(payload) => {
                        let _ = ws.send(Message::Pong(payload)).await;
                    }
                    other => {
                        if ws.send(other).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    });
    (format!("ws://{addr}/api/rt/ws"), handle)
}

#[tokio::test]
async fn connect_send_and_receive_echoed_text_frame() {
    let (url, _server) = echo_server().await;
    let mut transport = WebSocketTransport::new(TransportConfig::new(&url));

    let received = Arc::new(Notify::new());
    let received_text = Arc::new(std::sync::Mutex::new(None));
    let received2 = received.clone();
    let received_text2 = received_text.clone();

    let handlers = TransportHandlers {
        on_message: Arc::new(move |frame| {
            if let Inbound::Text(text) = frame {
                *received_text2.lock().unwrap() = Some(text);
                received2.notify_one();
            }
        }),
        on_close: Arc::new(|_, _| {}),
    };

    transport.connect(handlers).await.unwrap();
    assert_eq!(transport.connection_state().await, ConnectionState::Connected);

    transport.send_json(&serde_json::json!({"type": "ping"})).await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), received.notified()).await.unwrap();

    let echoed = received_text.lock().unwrap().clone().unwrap();
    assert_eq!(echoed, r#"{"type":"ping"}"#);

    transport.disconnect(1000, "done").await;
    assert_eq!(transport.connection_state().await, ConnectionState::Disconnected);
}

#[tokio::test]
async fn ping_timeout_transitions_to_disconnected_when_peer_goes_silent() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            // Accept the handshake, then never answer anything: no pong, no
            // reply frames, simulating a wedged peer.
            while ws.next().await.is_some() {}
        }
    });

    let mut config = TransportConfig::new(&format!("ws://{addr}/api/rt/ws"));
    config.timeouts.ping_interval = Some(Duration::from_millis(50));
    config.timeouts.pong_timeout = Duration::from_millis(50);
    let mut transport = WebSocketTransport::new(config);

    let handlers = TransportHandlers {
        on_message: Arc::new(|_| {}),
        on_close: Arc::new(|_, _| {}),
    };

    transport.connect(handlers).await.unwrap();
    assert_eq!(transport.connection_state().await, ConnectionState::Connected);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if transport.connection_state().await == ConnectionState::Disconnected {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "ping timeout never closed the transport");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
