//! WebSocket frame parsing and serialization
//!
//! This module implements the RFC 6455 frame layout:
//! - Three-tier payload length (7-bit inline, 16-bit and 64-bit extended)
//! - Optional 4-byte masking key
//! - Opcodes for text, binary, close, ping and pong
//!
//! Frames are decoded either straight from an async byte stream
//! (`read_frame`) or from the front of an accumulating buffer
//! (`decode_frame`). Encoding assembles the whole frame in one buffer so it
//! reaches the stream in a single write.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{CloseReason, Error, Result};
use crate::mask::{apply_mask, generate_mask};
use crate::{MAX_FRAME_HEADER_SIZE, MEDIUM_MESSAGE_THRESHOLD, SMALL_MESSAGE_THRESHOLD};

/// WebSocket opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// Continuation frame
    Continuation = 0x0,
    /// Text frame
    Text = 0x1,
    /// Binary frame
    Binary = 0x2,
    /// Connection close
    Close = 0x8,
    /// Ping
    Ping = 0x9,
    /// Pong
    Pong = 0xA,
}

impl OpCode {
    /// Parse opcode from the low nibble of the first header byte
    #[inline]
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x0 => Some(OpCode::Continuation),
            0x1 => Some(OpCode::Text),
            0x2 => Some(OpCode::Binary),
            0x8 => Some(OpCode::Close),
            0x9 => Some(OpCode::Ping),
            0xA => Some(OpCode::Pong),
            _ => None,
        }
    }

    /// Check if this is a control frame
    #[inline]
    pub fn is_control(&self) -> bool {
        (*self as u8) >= 0x8
    }

}

/// Number of extended length bytes used for a payload of `len` bytes
#[inline]
pub fn extended_len_size(len: u64) -> usize {
    if len <= SMALL_MESSAGE_THRESHOLD as u64 {
        0
    } else if len <= MEDIUM_MESSAGE_THRESHOLD as u64 {
        2
    } else {
        8
    }
}

/// A parsed WebSocket frame header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// Final fragment flag (recorded, never acted on)
    pub fin: bool,
    /// Frame opcode
    pub opcode: OpCode,
    /// Mask flag (must be true for client->server)
    pub masked: bool,
    /// Payload length
    pub payload_len: u64,
    /// Masking key (if masked)
    pub mask: Option<[u8; 4]>,
}

impl FrameHeader {
    /// Get the total header size in bytes
    #[inline]
    pub fn header_size(&self) -> usize {
        2 + extended_len_size(self.payload_len) + if self.masked { 4 } else { 0 }
    }

    /// Encode the frame header into a buffer
    #[inline]
    pub fn encode(&self, buf: &mut BytesMut) {
        let mut b0 = self.opcode as u8;
        if self.fin {
            b0 |= 0x80;
        }
        buf.put_u8(b0);

        let mask_bit = if self.mask.is_some() { 0x80 } else { 0x00 };

        match extended_len_size(self.payload_len) {
            0 => buf.put_u8(mask_bit | self.payload_len as u8),
            2 => {
                buf.put_u8(mask_bit | 126);
                buf.put_u16(self.payload_len as u16);
            }
            _ => {
                buf.put_u8(mask_bit | 127);
                buf.put_u64(self.payload_len);
            }
        }

        if let Some(mask) = self.mask {
            buf.put_slice(&mask);
        }
    }
}

/// A complete WebSocket frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header
    pub header: FrameHeader,
    /// Frame payload (already unmasked)
    pub payload: Bytes,
}

impl Frame {
    /// Create a new final, unmasked frame
    pub fn new(opcode: OpCode, payload: Bytes) -> Self {
        Self {
            header: FrameHeader {
                fin: true,
                opcode,
                masked: false,
                payload_len: payload.len() as u64,
                mask: None,
            },
            payload,
        }
    }

    /// Create a text frame
    #[inline]
    pub fn text(data: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Text, data.into())
    }

    /// Create a binary frame
    #[inline]
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Binary, data.into())
    }

    /// Create a ping frame
    #[inline]
    pub fn ping(data: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Ping, data.into())
    }

    /// Create a pong frame
    #[inline]
    pub fn pong(data: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Pong, data.into())
    }

    /// Create a close frame carrying a status code and reason
    #[inline]
    pub fn close(code: u16, reason: &str) -> Self {
        let payload = CloseReason::new(code, reason).to_payload();
        Self::new(OpCode::Close, Bytes::from(payload))
    }

    /// Create an empty close frame
    #[inline]
    pub fn close_empty() -> Self {
        Self::new(OpCode::Close, Bytes::new())
    }

    /// Frame opcode
    #[inline]
    pub fn opcode(&self) -> OpCode {
        self.header.opcode
    }

    /// Check if the frame arrived masked
    #[inline]
    pub fn is_masked(&self) -> bool {
        self.header.masked
    }

    /// Parse close frame payload
    pub fn parse_close(&self) -> Option<CloseReason> {
        CloseReason::from_payload(&self.payload)
    }
}

/// Encode a frame into a buffer.
///
/// FIN is always set. When `mask` is given the payload is copied and masked
/// after the key.
pub fn encode_frame(buf: &mut BytesMut, opcode: OpCode, payload: &[u8], mask: Option<[u8; 4]>) {
    let header = FrameHeader {
        fin: true,
        opcode,
        masked: mask.is_some(),
        payload_len: payload.len() as u64,
        mask,
    };

    buf.reserve(header.header_size() + payload.len());
    header.encode(buf);

    let start = buf.len();
    buf.put_slice(payload);
    if let Some(m) = mask {
        apply_mask(&mut buf[start..], m);
    }
}

/// The two fixed header bytes, split into fields
struct BaseHeader {
    fin: bool,
    opcode: OpCode,
    masked: bool,
    len_byte: u8,
}

impl BaseHeader {
    fn parse(head: [u8; 2]) -> Result<Self> {
        let opcode_bits = head[0] & 0x0F;
        let opcode = OpCode::from_u8(opcode_bits).ok_or(Error::UnsupportedOpcode(opcode_bits))?;

        Ok(Self {
            fin: head[0] & 0x80 != 0,
            opcode,
            masked: head[1] & 0x80 != 0,
            len_byte: head[1] & 0x7F,
        })
    }

    /// Number of extended length bytes that follow
    fn ext_len(&self) -> usize {
        match self.len_byte {
            126 => 2,
            127 => 8,
            _ => 0,
        }
    }

    fn into_header(self, payload_len: u64, mask: Option<[u8; 4]>) -> FrameHeader {
        FrameHeader {
            fin: self.fin,
            opcode: self.opcode,
            masked: self.masked,
            payload_len,
            mask,
        }
    }
}

fn check_len(len: u64, max_frame_size: usize) -> Result<()> {
    if len > max_frame_size as u64 {
        return Err(Error::OversizedLength {
            len,
            max: max_frame_size,
        });
    }
    Ok(())
}

/// Read exactly one frame from `reader`.
///
/// Blocks until the whole frame has arrived. A stream that ends cleanly before
/// the first header byte yields `ConnectionClosed`; one that ends anywhere
/// inside a frame yields `FrameRead`. Lengths above `max_frame_size` are
/// rejected before the payload is allocated.
pub async fn read_frame<R>(reader: &mut R, max_frame_size: usize) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let mut head = [0u8; 2];
    if reader.read(&mut head[..1]).await.map_err(Error::frame_read)? == 0 {
        return Err(Error::ConnectionClosed);
    }
    reader
        .read_exact(&mut head[1..])
        .await
        .map_err(Error::frame_read)?;

    let base = BaseHeader::parse(head)?;

    let payload_len = match base.ext_len() {
        2 => {
            let mut ext = [0u8; 2];
            reader
                .read_exact(&mut ext)
                .await
                .map_err(Error::frame_read)?;
            u16::from_be_bytes(ext) as u64
        }
        8 => {
            let mut ext = [0u8; 8];
            reader
                .read_exact(&mut ext)
                .await
                .map_err(Error::frame_read)?;
            u64::from_be_bytes(ext)
        }
        _ => base.len_byte as u64,
    };
    check_len(payload_len, max_frame_size)?;

    let mask = if base.masked {
        let mut key = [0u8; 4];
        reader
            .read_exact(&mut key)
            .await
            .map_err(Error::frame_read)?;
        Some(key)
    } else {
        None
    };

    let mut payload = vec![0u8; payload_len as usize];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(Error::frame_read)?;

    if let Some(key) = mask {
        apply_mask(&mut payload, key);
    }

    trace!(opcode = ?base.opcode, len = payload_len, masked = base.masked, "frame decoded");

    Ok(Frame {
        header: base.into_header(payload_len, mask),
        payload: Bytes::from(payload),
    })
}

/// Decode one frame from the front of `buf`.
///
/// Returns `Ok(None)` while `buf` holds less than a whole frame; nothing is
/// consumed in that case. Reserved opcodes and oversized lengths are reported
/// as soon as the header bytes are present, without waiting for the payload.
pub fn decode_frame(buf: &mut BytesMut, max_frame_size: usize) -> Result<Option<Frame>> {
    if buf.len() < 2 {
        return Ok(None);
    }

    let base = BaseHeader::parse([buf[0], buf[1]])?;
    let ext = base.ext_len();
    if buf.len() < 2 + ext {
        return Ok(None);
    }

    let payload_len = match ext {
        2 => u16::from_be_bytes([buf[2], buf[3]]) as u64,
        8 => {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&buf[2..10]);
            u64::from_be_bytes(bytes)
        }
        _ => base.len_byte as u64,
    };
    check_len(payload_len, max_frame_size)?;

    let header_len = 2 + ext + if base.masked { 4 } else { 0 };
    let total = header_len + payload_len as usize;
    if buf.len() < total {
        buf.reserve(total - buf.len());
        return Ok(None);
    }

    let mask = base
        .masked
        .then(|| [buf[2 + ext], buf[3 + ext], buf[4 + ext], buf[5 + ext]]);

    buf.advance(header_len);
    let mut payload = buf.split_to(payload_len as usize);
    if let Some(key) = mask {
        apply_mask(&mut payload, key);
    }

    trace!(opcode = ?base.opcode, len = payload_len, masked = base.masked, "frame decoded");

    Ok(Some(Frame {
        header: base.into_header(payload_len, mask),
        payload: payload.freeze(),
    }))
}

/// Encode and write one frame.
///
/// The header, optional mask key and payload go out in a single `write_all`.
/// With `must_mask` a fresh random key is generated for this frame.
pub async fn write_frame<W>(
    writer: &mut W,
    opcode: OpCode,
    payload: &[u8],
    must_mask: bool,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mask = must_mask.then(generate_mask);
    let mut buf = BytesMut::with_capacity(MAX_FRAME_HEADER_SIZE + payload.len());
    encode_frame(&mut buf, opcode, payload, mask);

    writer.write_all(&buf).await?;
    writer.flush().await?;

    trace!(?opcode, len = payload.len(), masked = must_mask, "frame written");
    Ok(())
}
