//! Async WebSocket stream implementation
//!
//! This module provides the `WebSocketStream` type that runs the
//! read -> decode -> dispatch -> reply loop over one upgraded connection.
//! It is a `futures` `Stream` of messages and a `Sink` for them.
//!
//! # Split Streams
//!
//! For concurrent send/receive, use the `split()` method:
//!
//! ```ignore
//! use futures_util::StreamExt;
//!
//! let (mut reader, mut writer) = ws.split();
//!
//! // Spawn a task for reading
//! let read_task = tokio::spawn(async move {
//!     while let Some(msg) = reader.next().await {
//!         println!("Received: {:?}", msg);
//!     }
//! });
//!
//! // Send messages from another task
//! writer.send_text("Hello").await?;
//! ```

mod websocket;

pub use websocket::*;
