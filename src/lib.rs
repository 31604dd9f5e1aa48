//! # wsframe: RFC 6455 handshake and frame codec
//!
//! A small WebSocket core for Tokio: the HTTP/1.1 upgrade handshake, the
//! binary frame codec, and a per-connection dispatch loop that answers pings
//! and completes the closing handshake.
//!
//! ## Scope
//!
//! - **Handshake**: upgrade validation, Sec-WebSocket-Accept derivation, 101/400 responses
//! - **Framing**: 7/16/64-bit length tiers, client masking, text/binary/close/ping/pong
//! - **Connections**: one task per connection, any `AsyncRead + AsyncWrite` transport
//!
//! No TLS, no extensions, no reassembly of fragmented messages.
//!
//! ## Example
//!
//! ```ignore
//! use futures_util::{SinkExt, StreamExt};
//! use tokio::net::TcpListener;
//! use wsframe::{Config, Message, WebSocketServer};
//!
//! let listener = TcpListener::bind("127.0.0.1:8082").await?;
//! let server = WebSocketServer::new(Config::default());
//!
//! server.serve(listener, |mut ws, _handshake| async move {
//!     while let Some(Ok(msg)) = ws.next().await {
//!         if let Message::Text(text) = msg {
//!             let _ = ws.send(Message::Text(text)).await;
//!         }
//!     }
//! }).await?;
//! ```

pub mod client;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod mask;
pub mod protocol;
pub mod server;
pub mod stream;

pub use client::WebSocketClient;
pub use error::{CloseReason, Error, Result};
pub use frame::{Frame, OpCode};
pub use protocol::{Message, Role, State};
pub use server::WebSocketServer;
pub use stream::{SplitReader, SplitWriter, WebSocketStream};

/// Default receive buffer size (64KB)
pub const RECV_BUFFER_SIZE: usize = 64 * 1024;

/// Maximum WebSocket frame header size (2 + 8 + 4 = 14 bytes)
pub const MAX_FRAME_HEADER_SIZE: usize = 14;

/// Largest payload that fits the inline 7-bit length (< 126 bytes)
pub const SMALL_MESSAGE_THRESHOLD: usize = 125;

/// Largest payload that fits the 16-bit extended length (< 64KB)
pub const MEDIUM_MESSAGE_THRESHOLD: usize = 65535;

/// Default maximum HTTP head size for the handshake (8KB)
pub const MAX_HEADER_SIZE: usize = 8 * 1024;

/// WebSocket GUID for handshake
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Configuration for WebSocket connections
///
/// # Example
///
/// ```
/// use wsframe::Config;
///
/// let config = Config::builder()
///     .max_frame_size(1024 * 1024)
///     .max_header_size(4096)
///     .build();
/// assert_eq!(config.max_frame_size, 1024 * 1024);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum frame payload accepted by the decoder (default: 16MB).
    /// Larger announced lengths fail with `Error::OversizedLength`.
    pub max_frame_size: usize,
    /// Maximum size of the HTTP head read during the handshake (default: 8KB)
    pub max_header_size: usize,
    /// Capacity of the connection's read buffer (default: 64KB)
    pub read_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024,
            max_header_size: MAX_HEADER_SIZE,
            read_buffer_size: RECV_BUFFER_SIZE,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Builder for WebSocket configuration
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Set maximum frame size
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Set maximum handshake head size
    pub fn max_header_size(mut self, size: usize) -> Self {
        self.config.max_header_size = size;
        self
    }

    /// Set read buffer capacity
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::Config;
    pub use crate::error::{CloseReason, Error, Result};
    pub use crate::frame::{Frame, OpCode};
    pub use crate::protocol::{Message, Role, State};
    pub use crate::stream::WebSocketStream;
    pub use crate::{WebSocketClient, WebSocketServer};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.max_frame_size, 16 * 1024 * 1024);
        assert_eq!(config.max_header_size, 8192);
        assert_eq!(config.read_buffer_size, RECV_BUFFER_SIZE);
    }

    #[test]
    fn test_config_builder() {
        let config = Config::builder()
            .max_frame_size(1024)
            .max_header_size(512)
            .read_buffer_size(4096)
            .build();
        assert_eq!(config.max_frame_size, 1024);
        assert_eq!(config.max_header_size, 512);
        assert_eq!(config.read_buffer_size, 4096);
    }

    #[test]
    fn test_thresholds_match_length_tiers() {
        assert_eq!(SMALL_MESSAGE_THRESHOLD + 1, 126);
        assert_eq!(MEDIUM_MESSAGE_THRESHOLD + 1, 65536);
        assert_eq!(MAX_FRAME_HEADER_SIZE, 2 + 8 + 4);
    }
}
