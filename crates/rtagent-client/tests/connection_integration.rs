//! End-to-end exercise of `ConnectionCore` against a real, in-process
//! `tokio-tungstenite` server: the clean-first-connect and
//! initialization-barrier scenario (S1 in the design notes).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use rtagent_client::{ClientConfig, ConnectionCore};

/// Starts a server that, once a client connects, pushes the six
/// initialization events and then echoes `ping` with `pong`.
async fn init_barrier_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        for event_type in ["chat_user_data", "avatar_list", "voice_list", "agent_list", "tool_catalog", "chat_session_changed"] {
            let frame = json!({"type": event_type, "session_id": "s1"});
            ws.send(Message::Text(frame.to_string().into())).await.unwrap();
        }

        while let Some(Ok(msg)) = ws.next().await {
            match msg {
                Message::Text(text) => {
                    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
                    if value.get("type").and_then(|v| v.as_str()) == Some("ping") {
                        ws.send(Message::Text(json!({"type": "pong"}).to_string().into())).await.unwrap();
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });
    format!("ws://{addr}")
}

#[tokio::test]
async fn clean_first_connect_reaches_initialized_after_six_catalog_events() {
    let base_url = init_barrier_server().await;
    let mut config = ClientConfig::new(base_url);
    config.auth_token = Some("tok".into());

    let core = ConnectionCore::new(config, None, None).unwrap();
    let bus = core.bus();
    let connected_count = Arc::new(AtomicUsize::new(0));
    let connected_count2 = connected_count.clone();
    bus.on("connected", move |_| {
        connected_count2.fetch_add(1, Ordering::SeqCst);
    });

    core.connect().await.unwrap();
    assert_eq!(connected_count.load(Ordering::SeqCst), 1);

    tokio::time::timeout(Duration::from_secs(2), core.wait_for_initialization()).await.unwrap();
    assert!(core.is_fully_initialized());

    core.ping().await.unwrap();

    core.disconnect().await;
}
