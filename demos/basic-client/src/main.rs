//! Minimal end-to-end walkthrough: connect, wait for the initialization
//! barrier to clear, send one text turn, then print whatever the agent
//! streams back until the process is interrupted.
//!
//! ```bash
//! RTAGENT_URL=wss://agents.example.com RTAGENT_TOKEN=... cargo run -p basic-client
//! ```

use std::env;

use rtagent::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let api_url = env::var("RTAGENT_URL").unwrap_or_else(|_| "wss://agents.example.com".to_string());
    let mut config = ClientConfig::new(api_url);
    config.auth_token = env::var("RTAGENT_TOKEN").ok();

    let core = ConnectionCore::new(config, None, None)?;
    let bus = core.bus();

    bus.on("text_delta", |payload| {
        if let Some(text) = payload.get("text").and_then(|v| v.as_str()) {
            print!("{text}");
        }
    });
    bus.on("message_completed", |_| println!());
    bus.on("error", |payload| tracing::warn!(?payload, "server reported an error"));

    tracing::info!("connecting...");
    core.connect().await?;

    tracing::info!("waiting for initialization barrier...");
    core.wait_for_initialization().await;

    core.text_input("Hello, agent!", vec![]).await?;

    tokio::signal::ctrl_c().await?;
    core.disconnect().await;
    Ok(())
}
