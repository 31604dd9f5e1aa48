//! Echo server
//!
//! Replies to every text message with `Server received: <text>` and echoes
//! binary messages unchanged.
//!
//! Run with: cargo run --example echo_server [addr]
//! Set RUST_LOG=wsframe=debug to see frame-level logs.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use wsframe::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8082".to_string());
    let listener = TcpListener::bind(&addr).await?;

    let server = WebSocketServer::new(Config::default());
    server
        .serve(listener, |mut ws, _handshake| async move {
            while let Some(msg) = ws.next().await {
                let msg = match msg {
                    Ok(msg) => msg,
                    Err(e) if e.is_disconnect() => {
                        debug!(error = %e, "peer disconnected");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "connection error");
                        break;
                    }
                };

                // Pong replies and the close echo are sent by the stream
                if msg.is_control() {
                    debug!(opcode = ?msg.opcode(), "control frame");
                    continue;
                }

                let reply = match msg {
                    Message::Text(data) => {
                        let text = String::from_utf8_lossy(&data);
                        info!(%text, "received text");
                        Message::text(format!("Server received: {}", text))
                    }
                    msg => msg,
                };

                if let Err(e) = ws.send(reply).await {
                    warn!(error = %e, "send failed");
                    break;
                }
            }
        })
        .await
}
