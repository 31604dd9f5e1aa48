//! Interactive client
//!
//! Sends each stdin line as a text message and prints whatever the server
//! sends back. Typing `quit` closes the connection.
//!
//! Run with: cargo run --example chat_client [ws://host:port/path]

use futures_util::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use wsframe::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://localhost:8082/".to_string());

    let client = WebSocketClient::new(Config::default());
    let (ws, _) = client.connect_to_url(&url).await?;
    info!(%url, "connected; type a message, or `quit` to exit");

    let (mut reader, mut writer) = ws.split();

    // Reader task
    let reader_task = tokio::spawn(async move {
        while let Some(msg) = reader.next().await {
            match msg {
                Ok(Message::Close(reason)) => {
                    info!(?reason, "server closed the connection");
                    break;
                }
                Ok(msg) => match msg.as_text() {
                    Some(text) => println!("< {}", text),
                    None => info!(opcode = ?msg.opcode(), "received non-text message"),
                },
                Err(e) => {
                    warn!(error = %e, "read failed");
                    break;
                }
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line == "quit" {
            writer.close(CloseReason::NORMAL, "").await?;
            break;
        }
        if let Err(e) = writer.send_text(line).await {
            warn!(error = %e, "send failed");
            break;
        }
    }

    reader_task.await.ok();
    Ok(())
}
