//! Joins `room:lobby` on a channels server, pings it and prints whatever
//! the room broadcasts for a few seconds.
//!
//! ```text
//! PHX_URL=ws://localhost:4000/socket/websocket RUST_LOG=debug cargo run -p lobby
//! ```

use std::time::Duration;

use phx_client::prelude::*;
use serde_json::json;
use tracing_subscriber::EnvFilter;

const DEFAULT_URL: &str = "ws://localhost:4000/socket/websocket";

/// Stop printing broadcasts after this many.
const MAX_MESSAGES: usize = 5;

/// Stop waiting for broadcasts after this long without one.
const IDLE_WAIT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let url = std::env::var("PHX_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let mut socket = Socket::builder(url.as_str())
        .param("user_id", std::process::id().to_string())
        .build()?;
    socket
        .scoped(async |socket: &Socket| {
            socket
                .channel("room:lobby", json!({}))
                .scoped(|mut lobby, joined| async move {
                    println!("joined {}: {joined}", lobby.topic());

                    let pong = lobby.push("ping", json!({})).await?.response().await?;
                    println!("ping -> {pong}");

                    for _ in 0..MAX_MESSAGES {
                        match tokio::time::timeout(IDLE_WAIT, lobby.receive()).await {
                            Ok(message) => {
                                let message = message?;
                                println!(
                                    "{} {}: {}",
                                    message.topic(),
                                    message.event(),
                                    message.payload()
                                );
                            }
                            Err(_) => {
                                tracing::info!("lobby went quiet");
                                break;
                            }
                        }
                    }
                    Ok(())
                })
                .await
        })
        .await?;
    Ok(())
}
