//! WebSocket server
//!
//! `WebSocketServer` upgrades accepted connections and hands each one to its
//! own task.
//!
//! # Example
//!
//! ```ignore
//! use futures_util::{SinkExt, StreamExt};
//! use tokio::net::TcpListener;
//! use wsframe::{Config, WebSocketServer};
//!
//! let listener = TcpListener::bind("127.0.0.1:8082").await?;
//! let server = WebSocketServer::new(Config::default());
//!
//! server.serve(listener, |mut ws, handshake| async move {
//!     tracing::info!(path = %handshake.path, "connected");
//!     while let Some(Ok(msg)) = ws.next().await {
//!         // echo messages
//!         if !msg.is_control() {
//!             let _ = ws.send(msg).await;
//!         }
//!     }
//! }).await?;
//! ```

use std::future::Future;

use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::error::{Error, Result};
use crate::handshake::{self, HandshakeResult};
use crate::protocol::Role;
use crate::{Config, WebSocketStream};

/// WebSocket server
#[derive(Debug, Clone, Default)]
pub struct WebSocketServer {
    config: Config,
}

impl WebSocketServer {
    /// Create a new WebSocket server with the given configuration
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Get the server configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Accept a WebSocket connection on an existing stream
    ///
    /// This performs the HTTP/1.1 upgrade handshake and returns a
    /// `WebSocketStream` on success. A rejected request has already been
    /// answered with `400 Bad Request` when this returns
    /// `Error::HandshakeRejected`; the caller should drop the stream.
    pub async fn accept<S>(&self, stream: S) -> Result<(WebSocketStream<S>, HandshakeResult)>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut stream = BufReader::with_capacity(self.config.read_buffer_size, stream);

        let handshake_result =
            handshake::server_handshake(&mut stream, self.config.max_header_size).await?;

        let ws = WebSocketStream::from_buffered(stream, Role::Server, self.config.clone());

        Ok((ws, handshake_result))
    }

    /// Serve WebSocket connections from a TCP listener
    ///
    /// Every accepted connection is upgraded and handled on its own task.
    /// Connections share nothing; a failure in one never affects another.
    /// Accept errors are logged and the loop keeps going.
    pub async fn serve<F, Fut>(&self, listener: TcpListener, handler: F) -> Result<()>
    where
        F: Fn(WebSocketStream<TcpStream>, HandshakeResult) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let local = listener.local_addr().map_err(Error::Io)?;
        info!(addr = %local, "WebSocket server listening");

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            };
            stream.set_nodelay(true).ok();

            let handler = handler.clone();
            let server = self.clone();
            let span = info_span!("ws_conn", %peer);

            tokio::spawn(
                async move {
                    debug!("connection received");
                    match server.accept(stream).await {
                        Ok((ws, handshake)) => {
                            info!(path = %handshake.path, "WebSocket connection established");
                            handler(ws, handshake).await;
                            debug!("connection finished");
                        }
                        Err(e) if e.is_disconnect() => {
                            debug!(error = %e, "peer left during handshake");
                        }
                        Err(e) => {
                            warn!(error = %e, "WebSocket handshake failed");
                        }
                    }
                }
                .instrument(span),
            );
        }
    }
}
