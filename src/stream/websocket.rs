//! WebSocket stream implementation
//!
//! This module provides the main `WebSocketStream` type and its split halves.
//!
//! Both halves share one `Conn` behind a mutex. Outbound frames, including
//! the Pong and Close replies produced by dispatch, are encoded into a single
//! write buffer while the lock is held, so the state check and the frame's
//! place in the byte stream are decided together.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker, ready};

use bytes::{Buf, Bytes, BytesMut};
use futures_core::Stream;
use futures_sink::Sink;
use parking_lot::Mutex;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, BufReader};
use tracing::{debug, trace, warn};

use crate::Config;
use crate::error::{CloseReason, Error, Result};
use crate::frame::{Frame, OpCode, decode_frame, encode_frame};
use crate::mask::generate_mask;
use crate::protocol::{Dispatch, Message, Protocol, Role, State};

/// Buffered outbound bytes above which `poll_ready` flushes first (64KB)
const WRITE_HIGH_WATER_MARK: usize = 64 * 1024;

/// Initial capacity of the inbound frame buffer
const READ_CHUNK: usize = 8 * 1024;

/// Connection state shared by the reading and writing halves
struct Conn<S> {
    io: BufReader<S>,
    protocol: Protocol,
    must_mask: bool,
    /// Encoded frames not yet written
    write_buf: BytesMut,
    /// Tasks parked on a flush that another task may finish
    write_waiters: Vec<Waker>,
}

impl<S> Conn<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn queue(&mut self, opcode: OpCode, payload: &[u8]) {
        let mask = self.must_mask.then(generate_mask);
        encode_frame(&mut self.write_buf, opcode, payload, mask);
        trace!(?opcode, len = payload.len(), masked = self.must_mask, "frame queued");
    }

    fn start_send(&mut self, msg: Message) -> Result<()> {
        self.protocol.on_send(&msg)?;

        let opcode = msg.opcode();
        let payload = msg.into_payload();
        self.queue(opcode, &payload);
        Ok(())
    }

    /// Run one inbound frame through the protocol, queueing any reply.
    fn dispatch(&mut self, frame: Frame) -> Result<Message> {
        match self.protocol.handle_frame(frame) {
            Ok(Dispatch { message, reply }) => {
                if let Some(reply) = reply {
                    self.queue(reply.opcode(), &reply.payload);
                    if reply.opcode() == OpCode::Close {
                        self.protocol.close_replied();
                    }
                }
                Ok(message)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Queue a best-effort error close and mark the connection dead.
    fn fail(&mut self, error: Error) -> Error {
        let code = match error {
            Error::OversizedLength { .. } => CloseReason::TOO_BIG,
            _ => CloseReason::PROTOCOL_ERROR,
        };
        warn!(%error, code, "closing connection on protocol error");

        // After our own Close nothing else may be sent
        if self.protocol.state() == State::Open {
            self.queue(OpCode::Close, &CloseReason::new(code, "").to_payload());
        }
        self.protocol.terminate();
        error
    }

    fn poll_flush(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        while !self.write_buf.is_empty() {
            match Pin::new(&mut self.io).poll_write(cx, &self.write_buf) {
                Poll::Ready(Ok(0)) => {
                    return self.write_failed(io::ErrorKind::WriteZero.into());
                }
                Poll::Ready(Ok(n)) => self.write_buf.advance(n),
                Poll::Ready(Err(e)) => return self.write_failed(e),
                Poll::Pending => {
                    self.park(cx.waker());
                    return Poll::Pending;
                }
            }
        }

        match Pin::new(&mut self.io).poll_flush(cx) {
            Poll::Ready(Ok(())) => {
                self.wake_waiters();
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(e)) => self.write_failed(e),
            Poll::Pending => {
                self.park(cx.waker());
                Poll::Pending
            }
        }
    }

    fn write_failed(&mut self, e: io::Error) -> Poll<Result<()>> {
        debug!(error = %e, "write failed");
        self.protocol.terminate();
        self.write_buf.clear();
        self.wake_waiters();
        Poll::Ready(Err(e.into()))
    }

    /// The transport keeps one write waker, so other parked tasks are
    /// remembered here and woken once the buffer drains.
    fn park(&mut self, waker: &Waker) {
        if !self.write_waiters.iter().any(|w| w.will_wake(waker)) {
            self.write_waiters.push(waker.clone());
        }
    }

    fn wake_waiters(&mut self) {
        for waker in self.write_waiters.drain(..) {
            waker.wake();
        }
    }
}

/// A WebSocket stream over an async transport
///
/// Implements `Stream<Item = Result<Message>>` for receiving and
/// `Sink<Message>` for sending. Frames are dispatched strictly in arrival
/// order; Pong and Close replies are flushed before the frame that caused
/// them is handed out.
///
/// # Example
///
/// ```ignore
/// use futures_util::{SinkExt, StreamExt};
/// use wsframe::{Message, WebSocketStream};
///
/// async fn handle(mut ws: WebSocketStream<TcpStream>) -> wsframe::Result<()> {
///     while let Some(msg) = ws.next().await {
///         match msg? {
///             Message::Text(text) => ws.send(Message::Text(text)).await?,
///             Message::Close(_) => break,
///             _ => {}
///         }
///     }
///     Ok(())
/// }
/// ```
pub struct WebSocketStream<S> {
    reader: SplitReader<S>,
    writer: SplitWriter<S>,
}

impl<S> WebSocketStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a WebSocket stream from a buffered, already-upgraded connection.
    ///
    /// Bytes still sitting in the buffer after the handshake are decoded as
    /// frames.
    pub fn from_buffered(inner: BufReader<S>, role: Role, config: Config) -> Self {
        let shared = Arc::new(Mutex::new(Conn {
            io: inner,
            protocol: Protocol::new(role),
            must_mask: role == Role::Client,
            write_buf: BytesMut::new(),
            write_waiters: Vec::new(),
        }));

        Self {
            reader: SplitReader {
                shared: shared.clone(),
                read_buf: BytesMut::with_capacity(READ_CHUNK),
                max_frame_size: config.max_frame_size,
                pending: None,
            },
            writer: SplitWriter { shared },
        }
    }

    /// Create a WebSocket stream from an already-upgraded connection
    pub fn from_raw(inner: S, role: Role, config: Config) -> Self {
        let inner = BufReader::with_capacity(config.read_buffer_size, inner);
        Self::from_buffered(inner, role, config)
    }

    /// Create a server-side WebSocket stream
    pub fn server(inner: S, config: Config) -> Self {
        Self::from_raw(inner, Role::Server, config)
    }

    /// Create a client-side WebSocket stream
    pub fn client(inner: S, config: Config) -> Self {
        Self::from_raw(inner, Role::Client, config)
    }

    /// Send a text message
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<()> {
        self.writer.send_text(text).await
    }

    /// Send a binary message
    pub async fn send_binary(&mut self, data: impl Into<Bytes>) -> Result<()> {
        self.writer.send_binary(data).await
    }

    /// Send a ping
    pub async fn ping(&mut self, data: impl Into<Bytes>) -> Result<()> {
        self.writer.ping(data).await
    }

    /// Start the closing handshake
    pub async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        self.writer.close(code, reason).await
    }

    /// Current connection state
    pub fn state(&self) -> State {
        self.writer.state()
    }

    /// Check if the connection is closed
    pub fn is_closed(&self) -> bool {
        self.state() == State::Closed
    }

    /// Split into independently usable reading and writing halves
    ///
    /// This allows concurrent reading and writing from different tasks.
    pub fn split(self) -> (SplitReader<S>, SplitWriter<S>) {
        (self.reader, self.writer)
    }
}

impl<S> Stream for WebSocketStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    type Item = Result<Message>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().reader).poll_next(cx)
    }
}

impl<S> Sink<Message> for WebSocketStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    type Error = Error;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        Pin::new(&mut self.get_mut().writer).poll_ready(cx)
    }

    fn start_send(self: Pin<&mut Self>, item: Message) -> Result<()> {
        Pin::new(&mut self.get_mut().writer).start_send(item)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        Pin::new(&mut self.get_mut().writer).poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        Pin::new(&mut self.get_mut().writer).poll_close(cx)
    }
}

/// The read half of a split WebSocket stream
///
/// Still answers pings and close frames through the shared write buffer.
pub struct SplitReader<S> {
    shared: Arc<Mutex<Conn<S>>>,
    read_buf: BytesMut,
    max_frame_size: usize,
    /// Item held back until the replies queued for it are flushed
    pending: Option<Result<Message>>,
}

impl<S> SplitReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Current connection state
    pub fn state(&self) -> State {
        self.shared.lock().protocol.state()
    }
}

impl<S> Stream for SplitReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    type Item = Result<Message>;

    /// Yields `None` once the connection is closed. A read or protocol error
    /// is yielded once and closes the connection.
    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let mut conn = this.shared.lock();

        loop {
            if let Some(item) = this.pending.take() {
                return match conn.poll_flush(cx) {
                    Poll::Pending => {
                        this.pending = Some(item);
                        Poll::Pending
                    }
                    // A failed error-close still reports the original error
                    Poll::Ready(Err(e)) if item.is_ok() => Poll::Ready(Some(Err(e))),
                    Poll::Ready(_) => Poll::Ready(Some(item)),
                };
            }

            if conn.protocol.is_closed() {
                return Poll::Ready(None);
            }

            let queued = conn.write_buf.len();
            let item = match decode_frame(&mut this.read_buf, this.max_frame_size) {
                Ok(Some(frame)) => conn.dispatch(frame),
                Err(e) => Err(conn.fail(e)),
                Ok(None) => {
                    let n = match Pin::new(&mut conn.io).poll_fill_buf(cx) {
                        Poll::Ready(Ok(bytes)) => {
                            this.read_buf.extend_from_slice(bytes);
                            bytes.len()
                        }
                        Poll::Ready(Err(e)) => {
                            debug!(error = %e, "frame read failed");
                            conn.protocol.terminate();
                            return Poll::Ready(Some(Err(Error::frame_read(e))));
                        }
                        Poll::Pending => return Poll::Pending,
                    };

                    if n == 0 {
                        conn.protocol.terminate();
                        if this.read_buf.is_empty() {
                            debug!("peer closed the stream");
                            return Poll::Ready(None);
                        }
                        debug!(buffered = this.read_buf.len(), "stream ended inside a frame");
                        let eof = io::Error::from(io::ErrorKind::UnexpectedEof);
                        return Poll::Ready(Some(Err(Error::frame_read(eof))));
                    }

                    Pin::new(&mut conn.io).consume(n);
                    continue;
                }
            };

            if conn.write_buf.len() > queued {
                this.pending = Some(item);
                continue;
            }
            return Poll::Ready(Some(item));
        }
    }
}

/// The write half of a split WebSocket stream
pub struct SplitWriter<S> {
    shared: Arc<Mutex<Conn<S>>>,
}

impl<S> SplitWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    async fn send_message(&mut self, msg: Message) -> Result<()> {
        std::future::poll_fn(|cx| Pin::new(&mut *self).poll_ready(cx)).await?;
        Pin::new(&mut *self).start_send(msg)?;
        std::future::poll_fn(|cx| Pin::new(&mut *self).poll_flush(cx)).await
    }

    /// Send a text message
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<()> {
        self.send_message(Message::text(text)).await
    }

    /// Send a binary message
    pub async fn send_binary(&mut self, data: impl Into<Bytes>) -> Result<()> {
        self.send_message(Message::Binary(data.into())).await
    }

    /// Send a ping
    pub async fn ping(&mut self, data: impl Into<Bytes>) -> Result<()> {
        self.send_message(Message::Ping(data.into())).await
    }

    /// Send a close frame
    pub async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        self.send_message(Message::Close(Some(CloseReason::new(code, reason))))
            .await
    }

    /// Current connection state
    pub fn state(&self) -> State {
        self.shared.lock().protocol.state()
    }
}

impl<S> Sink<Message> for SplitWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    type Error = Error;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        let mut conn = self.shared.lock();
        if conn.write_buf.len() >= WRITE_HIGH_WATER_MARK {
            conn.poll_flush(cx)
        } else {
            Poll::Ready(Ok(()))
        }
    }

    fn start_send(self: Pin<&mut Self>, item: Message) -> Result<()> {
        self.shared.lock().start_send(item)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.shared.lock().poll_flush(cx)
    }

    /// Sends a normal Close if none was sent yet, flushes, then shuts down
    /// the write side of the transport.
    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        let mut conn = self.shared.lock();
        if conn.protocol.state() == State::Open {
            conn.start_send(Message::Close(Some(CloseReason::new(CloseReason::NORMAL, ""))))?;
        }

        ready!(conn.poll_flush(cx))?;
        Pin::new(&mut conn.io).poll_shutdown(cx).map_err(Error::from)
    }
}

impl<S> std::fmt::Debug for WebSocketStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let conn = self.writer.shared.lock();
        f.debug_struct("WebSocketStream")
            .field("state", &conn.protocol.state())
            .field("buffered", &conn.write_buf.len())
            .finish_non_exhaustive()
    }
}
