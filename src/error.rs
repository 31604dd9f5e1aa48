//! Error types for the handshake and frame codec

use std::fmt;
use std::io;

/// Result type alias for WebSocket operations
pub type Result<T> = std::result::Result<T, Error>;

/// WebSocket error types
///
/// Every variant is local to a single connection. Nothing in this crate
/// retries; reconnect policy belongs to the caller.
#[derive(Debug)]
pub enum Error {
    /// I/O error from the underlying socket (writes, accept, connect)
    Io(io::Error),
    /// The stream ended or failed while a frame was partially read
    FrameRead(io::Error),
    /// Upgrade request was missing required headers or the key
    HandshakeRejected(&'static str),
    /// Server-supplied Sec-WebSocket-Accept did not match the local token
    AcceptTokenMismatch,
    /// Decoded payload length exceeds the configured ceiling
    OversizedLength {
        /// Length announced by the frame header
        len: u64,
        /// Configured maximum frame size
        max: usize,
    },
    /// Continuation or reserved opcode
    UnsupportedOpcode(u8),
    /// Protocol violation (e.g. wrong masking direction)
    Protocol(&'static str),
    /// Malformed HTTP preamble
    InvalidHttp(&'static str),
    /// Unusable `ws://` URL
    InvalidUrl(&'static str),
    /// Connection closed (clean EOF, or use after close)
    ConnectionClosed,
}

/// Close frame reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// Close status code
    pub code: u16,
    /// Optional reason string
    pub reason: String,
}

impl CloseReason {
    /// Normal closure
    pub const NORMAL: u16 = 1000;
    /// Going away (e.g., server shutdown)
    pub const GOING_AWAY: u16 = 1001;
    /// Protocol error
    pub const PROTOCOL_ERROR: u16 = 1002;
    /// Message too big
    pub const TOO_BIG: u16 = 1009;

    /// Create a new close reason
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Decode a Close payload. Payloads shorter than two bytes carry no status.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        if payload.len() < 2 {
            return None;
        }
        let code = u16::from_be_bytes([payload[0], payload[1]]);
        let reason = String::from_utf8_lossy(&payload[2..]).into_owned();
        Some(Self::new(code, reason))
    }

    /// Encode as a Close payload (status code followed by UTF-8 reason)
    pub fn to_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(2 + self.reason.len());
        payload.extend_from_slice(&self.code.to_be_bytes());
        payload.extend_from_slice(self.reason.as_bytes());
        payload
    }
}

impl Error {
    /// Wrap an I/O error raised while reading a frame.
    ///
    /// A clean EOF before the first header byte is reported by the caller as
    /// `ConnectionClosed`; anything that reaches here is mid-frame.
    pub(crate) fn frame_read(e: io::Error) -> Self {
        Error::FrameRead(e)
    }

    /// True if this error means the peer is gone rather than misbehaving
    pub fn is_disconnect(&self) -> bool {
        match self {
            Error::ConnectionClosed => true,
            Error::FrameRead(e) | Error::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::FrameRead(e) => write!(f, "Frame read error: {}", e),
            Error::HandshakeRejected(msg) => write!(f, "Handshake rejected: {}", msg),
            Error::AcceptTokenMismatch => write!(f, "Sec-WebSocket-Accept mismatch"),
            Error::OversizedLength { len, max } => {
                write!(f, "Frame length {} exceeds limit {}", len, max)
            }
            Error::UnsupportedOpcode(op) => write!(f, "Unsupported opcode: {:#x}", op),
            Error::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            Error::InvalidHttp(msg) => write!(f, "Invalid HTTP: {}", msg),
            Error::InvalidUrl(msg) => write!(f, "Invalid URL: {}", msg),
            Error::ConnectionClosed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) | Error::FrameRead(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::BrokenPipe | io::ErrorKind::UnexpectedEof => Error::ConnectionClosed,
            _ => Error::Io(e),
        }
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Io(e) | Error::FrameRead(e) => e,
            Error::ConnectionClosed => {
                io::Error::new(io::ErrorKind::BrokenPipe, "connection closed")
            }
            other => io::Error::other(other.to_string()),
        }
    }
}
