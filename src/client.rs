//! WebSocket client
//!
//! `WebSocketClient` performs the client side of the upgrade handshake,
//! verifying the server's Sec-WebSocket-Accept before any frame is sent.
//!
//! # Example
//!
//! ```ignore
//! use futures_util::SinkExt;
//! use wsframe::{Config, Message, WebSocketClient};
//!
//! let client = WebSocketClient::new(Config::default());
//! let (mut ws, _) = client.connect_to_url("ws://127.0.0.1:8082/").await?;
//! ws.send(Message::text("Hello!")).await?;
//! ```

use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{Error, Result};
use crate::handshake::{self, HandshakeResult};
use crate::protocol::Role;
use crate::{Config, WebSocketStream};

/// Parsed `ws://` URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsUrl<'a> {
    /// Host without port
    pub host: &'a str,
    /// Port (80 when absent)
    pub port: u16,
    /// `host[:port]` as written, used for the Host header
    pub authority: &'a str,
    /// Request path, `/` when absent
    pub path: &'a str,
}

/// Parse a `ws://host[:port][/path]` URL.
///
/// `wss://` is rejected; TLS is not supported.
pub fn parse_url(url: &str) -> Result<WsUrl<'_>> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or(Error::InvalidUrl("missing scheme"))?;

    match scheme {
        "ws" => {}
        "wss" => return Err(Error::InvalidUrl("wss is not supported")),
        _ => return Err(Error::InvalidUrl("expected ws scheme")),
    }

    let (authority, path) = rest
        .find('/')
        .map(|i| (&rest[..i], &rest[i..]))
        .unwrap_or((rest, "/"));

    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| Error::InvalidUrl("invalid port"))?;
            (host, port)
        }
        None => (authority, 80),
    };

    if host.is_empty() {
        return Err(Error::InvalidUrl("missing host"));
    }

    Ok(WsUrl {
        host,
        port,
        authority,
        path,
    })
}

/// WebSocket client
#[derive(Debug, Clone, Default)]
pub struct WebSocketClient {
    config: Config,
}

impl WebSocketClient {
    /// Create a new WebSocket client with the given configuration
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Get the client configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Connect to a WebSocket server over an existing stream
    ///
    /// # Arguments
    ///
    /// * `stream` - The underlying transport
    /// * `host` - The Host header value
    /// * `path` - The request path (e.g., "/ws")
    ///
    /// Fails with `Error::AcceptTokenMismatch` if the server's accept token
    /// does not match the key we sent.
    pub async fn connect<S>(
        &self,
        stream: S,
        host: &str,
        path: &str,
    ) -> Result<(WebSocketStream<S>, HandshakeResult)>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut stream = BufReader::with_capacity(self.config.read_buffer_size, stream);

        let handshake_result =
            handshake::client_handshake(&mut stream, host, path, self.config.max_header_size)
                .await?;

        let ws = WebSocketStream::from_buffered(stream, Role::Client, self.config.clone());

        Ok((ws, handshake_result))
    }

    /// Connect to a WebSocket server using a URL
    ///
    /// Establishes the TCP connection and performs the handshake.
    pub async fn connect_to_url(
        &self,
        url: &str,
    ) -> Result<(WebSocketStream<TcpStream>, HandshakeResult)> {
        let url = parse_url(url)?;

        let stream = TcpStream::connect((url.host, url.port))
            .await
            .map_err(Error::Io)?;
        stream.set_nodelay(true).ok();
        debug!(host = url.host, port = url.port, "TCP connection established");

        self.connect(stream, url.authority, url.path).await
    }
}
