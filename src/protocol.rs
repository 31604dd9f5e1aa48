//! WebSocket protocol implementation
//!
//! This module holds the per-connection opcode dispatch:
//! - Role-based masking checks
//! - Control frame handling (ping/pong/close)
//! - State transitions `Open -> Closing -> Closed`
//!
//! It performs no I/O. Replies it asks for are queued by the stream ahead of
//! any later frame and flushed before the message is handed out.

use bytes::Bytes;
use tracing::debug;

use crate::error::{CloseReason, Error, Result};
use crate::frame::{Frame, OpCode};

/// WebSocket endpoint role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Client (must mask frames)
    Client,
    /// Server (must not mask frames)
    Server,
}

/// WebSocket message, one per single-frame message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Text message
    Text(Bytes),
    /// Binary message
    Binary(Bytes),
    /// Ping message
    Ping(Bytes),
    /// Pong message
    Pong(Bytes),
    /// Close message
    Close(Option<CloseReason>),
}

impl Message {
    /// Create a text message from a string
    #[inline]
    pub fn text(s: impl Into<String>) -> Self {
        Message::Text(Bytes::from(s.into()))
    }

    /// Create a binary message
    #[inline]
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Message::Binary(data.into())
    }

    /// Check if this is a close message
    #[inline]
    pub fn is_close(&self) -> bool {
        matches!(self, Message::Close(_))
    }

    /// Check if this is a control message
    #[inline]
    pub fn is_control(&self) -> bool {
        self.opcode().is_control()
    }

    /// Get message as text. `None` for non-text messages or invalid UTF-8.
    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Opcode this message is sent with
    pub fn opcode(&self) -> OpCode {
        match self {
            Message::Text(_) => OpCode::Text,
            Message::Binary(_) => OpCode::Binary,
            Message::Ping(_) => OpCode::Ping,
            Message::Pong(_) => OpCode::Pong,
            Message::Close(_) => OpCode::Close,
        }
    }

    /// Wire payload of this message
    pub fn into_payload(self) -> Bytes {
        match self {
            Message::Text(b) | Message::Binary(b) | Message::Ping(b) | Message::Pong(b) => b,
            Message::Close(Some(reason)) => Bytes::from(reason.to_payload()),
            Message::Close(None) => Bytes::new(),
        }
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Message::Text(Bytes::from(s))
    }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Message::Text(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<Vec<u8>> for Message {
    fn from(v: Vec<u8>) -> Self {
        Message::Binary(Bytes::from(v))
    }
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Normal operation
    Open,
    /// A Close frame has been sent or received, handshake not finished
    Closing,
    /// Connection closed
    Closed,
}

/// Outcome of dispatching one inbound frame
#[derive(Debug, PartialEq, Eq)]
pub struct Dispatch {
    /// Message for the application
    pub message: Message,
    /// Frame that must be written back before reading again
    pub reply: Option<Frame>,
}

/// WebSocket protocol handler
pub struct Protocol {
    role: Role,
    state: State,
    /// Set when the current `Closing` state was entered by our own Close
    close_sent: bool,
}

impl Protocol {
    /// Create a new protocol handler
    pub fn new(role: Role) -> Self {
        Self {
            role,
            state: State::Open,
            close_sent: false,
        }
    }

    /// Endpoint role
    #[inline]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current state
    #[inline]
    pub fn state(&self) -> State {
        self.state
    }

    /// Check if connection is closed
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// Whether frames we write must be masked
    #[inline]
    pub fn must_mask(&self) -> bool {
        self.role == Role::Client
    }

    /// Dispatch one decoded frame
    pub fn handle_frame(&mut self, frame: Frame) -> Result<Dispatch> {
        if self.state == State::Closed {
            return Err(Error::ConnectionClosed);
        }

        match (self.role, frame.is_masked()) {
            (Role::Server, false) => return Err(Error::Protocol("client frames must be masked")),
            (Role::Client, true) => {
                return Err(Error::Protocol("server frames must not be masked"));
            }
            _ => {}
        }

        let dispatch = match frame.opcode() {
            OpCode::Text => Dispatch {
                message: Message::Text(frame.payload),
                reply: None,
            },
            OpCode::Binary => Dispatch {
                message: Message::Binary(frame.payload),
                reply: None,
            },
            OpCode::Ping => Dispatch {
                reply: Some(Frame::pong(frame.payload.clone())),
                message: Message::Ping(frame.payload),
            },
            OpCode::Pong => Dispatch {
                message: Message::Pong(frame.payload),
                reply: None,
            },
            OpCode::Close => self.handle_close(frame),
            OpCode::Continuation => return Err(Error::UnsupportedOpcode(OpCode::Continuation as u8)),
        };

        Ok(dispatch)
    }

    fn handle_close(&mut self, frame: Frame) -> Dispatch {
        let reason = frame.parse_close();

        if self.close_sent {
            debug!(?reason, "close handshake completed");
            self.state = State::Closed;
            return Dispatch {
                message: Message::Close(reason),
                reply: None,
            };
        }

        debug!(?reason, "peer initiated close");
        self.state = State::Closing;
        Dispatch {
            message: Message::Close(reason),
            reply: Some(Frame::new(OpCode::Close, frame.payload)),
        }
    }

    /// Check an outbound message against the current state.
    ///
    /// Sending Close from `Open` enters `Closing`.
    pub fn on_send(&mut self, msg: &Message) -> Result<()> {
        match self.state {
            State::Closing | State::Closed => Err(Error::ConnectionClosed),
            State::Open => {
                if msg.is_close() {
                    self.state = State::Closing;
                    self.close_sent = true;
                }
                Ok(())
            }
        }
    }

    /// Record that the Close echo has been written.
    pub fn close_replied(&mut self) {
        if self.state == State::Closing && !self.close_sent {
            self.state = State::Closed;
        }
    }

    /// Mark the connection dead after a fatal error.
    pub fn terminate(&mut self) {
        self.state = State::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn masked(mut frame: Frame) -> Frame {
        frame.header.masked = true;
        frame.header.mask = Some([1, 2, 3, 4]);
        frame
    }

    #[test]
    fn test_message_text() {
        let msg = Message::text("hello");
        assert_eq!(msg.as_text(), Some("hello"));
        assert_eq!(msg.opcode(), OpCode::Text);
        assert!(!msg.is_control());
        assert_eq!(Message::binary(vec![1u8]).as_text(), None);
    }

    #[test]
    fn test_close_message_payload() {
        let msg = Message::Close(Some(CloseReason::new(1000, "bye")));
        assert_eq!(msg.opcode(), OpCode::Close);
        assert_eq!(msg.into_payload().as_ref(), &[0x03, 0xE8, b'b', b'y', b'e']);
        assert!(Message::Close(None).into_payload().is_empty());
    }

    #[test]
    fn test_data_frames_delivered() {
        let mut proto = Protocol::new(Role::Server);
        let d = proto.handle_frame(masked(Frame::text("hi"))).unwrap();
        assert_eq!(d.message, Message::text("hi"));
        assert!(d.reply.is_none());

        let d = proto.handle_frame(masked(Frame::binary(vec![1u8, 2]))).unwrap();
        assert_eq!(d.message, Message::binary(vec![1u8, 2]));
        assert_eq!(proto.state(), State::Open);
    }

    #[test]
    fn test_ping_elicits_pong() {
        let mut proto = Protocol::new(Role::Server);
        let d = proto.handle_frame(masked(Frame::ping("abc"))).unwrap();

        let reply = d.reply.unwrap();
        assert_eq!(reply.opcode(), OpCode::Pong);
        assert_eq!(reply.payload.as_ref(), b"abc");
        assert_eq!(d.message, Message::Ping(Bytes::from_static(b"abc")));
        assert_eq!(proto.state(), State::Open);
    }

    #[test]
    fn test_pong_no_reply() {
        let mut proto = Protocol::new(Role::Server);
        let d = proto.handle_frame(masked(Frame::pong("x"))).unwrap();
        assert!(d.reply.is_none());
        assert_eq!(proto.state(), State::Open);
    }

    #[test]
    fn test_peer_close_echoed() {
        let mut proto = Protocol::new(Role::Server);
        let d = proto.handle_frame(masked(Frame::close(1000, "done"))).unwrap();

        assert_eq!(proto.state(), State::Closing);
        let reply = d.reply.unwrap();
        assert_eq!(reply.opcode(), OpCode::Close);
        assert_eq!(reply.parse_close(), Some(CloseReason::new(1000, "done")));
        assert_eq!(
            d.message,
            Message::Close(Some(CloseReason::new(1000, "done")))
        );

        proto.close_replied();
        assert!(proto.is_closed());
    }

    #[test]
    fn test_local_close_completes_on_peer_close() {
        let mut proto = Protocol::new(Role::Client);
        proto.on_send(&Message::Close(None)).unwrap();
        assert_eq!(proto.state(), State::Closing);
        assert!(proto.on_send(&Message::text("late")).is_err());

        let d = proto.handle_frame(Frame::close_empty()).unwrap();
        assert!(d.reply.is_none());
        assert!(proto.is_closed());
    }

    #[test]
    fn test_continuation_rejected() {
        let mut proto = Protocol::new(Role::Server);
        let frame = masked(Frame::new(OpCode::Continuation, Bytes::from_static(b"x")));
        let err = proto.handle_frame(frame).unwrap_err();
        assert!(matches!(err, Error::UnsupportedOpcode(0x0)));
    }

    #[test]
    fn test_masking_direction_enforced() {
        let mut server = Protocol::new(Role::Server);
        assert!(matches!(
            server.handle_frame(Frame::text("plain")),
            Err(Error::Protocol(_))
        ));

        let mut client = Protocol::new(Role::Client);
        assert!(matches!(
            client.handle_frame(masked(Frame::text("masked"))),
            Err(Error::Protocol(_))
        ));
        assert!(client.must_mask());
        assert!(!server.must_mask());
    }

    #[test]
    fn test_closed_rejects_everything() {
        let mut proto = Protocol::new(Role::Server);
        proto.terminate();
        assert!(matches!(
            proto.handle_frame(masked(Frame::text("x"))),
            Err(Error::ConnectionClosed)
        ));
        assert!(matches!(
            proto.on_send(&Message::text("x")),
            Err(Error::ConnectionClosed)
        ));
    }
}
