//! WebSocket handshake implementation
//!
//! This module handles the HTTP/1.1 upgrade exchange that precedes framing:
//! - Upgrade intent validation
//! - Sec-WebSocket-Accept derivation (Base64(SHA-1(key + GUID)))
//! - Request/response building and parsing with `httparse`
//!
//! The async sequences read the HTTP head line by line from a buffered
//! stream, so bytes that follow the head stay in the buffer for the frame
//! codec.

use base64::Engine;
use bytes::{BufMut, Bytes, BytesMut};
use sha1::{Digest, Sha1};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::WS_GUID;
use crate::error::{Error, Result};

/// Maximum number of headers parsed from a handshake head
const MAX_HEADERS: usize = 64;

/// Response sent when an upgrade request is rejected
const BAD_REQUEST: &[u8] = b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n";

/// WebSocket handshake request (server-side)
///
/// Only the headers the validator consumes are kept; everything borrows from
/// the read buffer.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HandshakeRequest<'a> {
    /// Request method
    pub method: &'a str,
    /// The request path
    pub path: &'a str,
    /// The Host header
    pub host: Option<&'a str>,
    /// The Upgrade header
    pub upgrade: Option<&'a str>,
    /// The Connection header
    pub connection: Option<&'a str>,
    /// The Sec-WebSocket-Key header
    pub key: Option<&'a str>,
    /// The Sec-WebSocket-Version header
    pub version: Option<&'a str>,
}

/// True iff `Upgrade` is `websocket` and `Connection` lists `upgrade`.
///
/// Both comparisons ignore ASCII case. `Connection` may carry several
/// comma-separated tokens, so it is a substring match. Absent headers yield
/// false.
pub fn is_upgrade_request(req: &HandshakeRequest<'_>) -> bool {
    let upgrade = req
        .upgrade
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"));
    let connection = req
        .connection
        .is_some_and(|v| v.to_ascii_lowercase().contains("upgrade"));
    upgrade && connection
}

/// Parse an HTTP request head
///
/// Returns the parsed request and the number of bytes consumed, or `None` if
/// the head is incomplete. No upgrade validation happens here.
///
/// Only the headers the validator reads are decoded as UTF-8; a value that
/// is not valid UTF-8 is treated as absent. Any other header is skipped
/// without looking at its value.
pub fn parse_request(buf: &[u8]) -> Result<Option<(HandshakeRequest<'_>, usize)>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let parsed = match parse_request_into(buf, &mut headers) {
        Err(httparse::Error::TooManyHeaders) => {
            // Each header takes a line of its own
            let lines = buf.iter().filter(|&&b| b == b'\n').count();
            let mut headers = vec![httparse::EMPTY_HEADER; lines];
            parse_request_into(buf, &mut headers)
        }
        other => other,
    };

    parsed.map_err(|_| Error::InvalidHttp("failed to parse HTTP request"))
}

fn parse_request_into<'b>(
    buf: &'b [u8],
    headers: &mut [httparse::Header<'b>],
) -> std::result::Result<Option<(HandshakeRequest<'b>, usize)>, httparse::Error> {
    let mut req = httparse::Request::new(headers);

    let len = match req.parse(buf)? {
        httparse::Status::Complete(len) => len,
        httparse::Status::Partial => return Ok(None),
    };

    let mut parsed = HandshakeRequest {
        method: req.method.unwrap_or(""),
        path: req.path.unwrap_or("/"),
        ..HandshakeRequest::default()
    };

    for header in req.headers.iter() {
        let slot = match header.name.to_ascii_lowercase().as_str() {
            "host" => &mut parsed.host,
            "upgrade" => &mut parsed.upgrade,
            "connection" => &mut parsed.connection,
            "sec-websocket-key" => &mut parsed.key,
            "sec-websocket-version" => &mut parsed.version,
            _ => continue,
        };
        *slot = std::str::from_utf8(header.value).ok();
    }

    Ok(Some((parsed, len)))
}

/// Compute the Sec-WebSocket-Accept token for a client key
///
/// This computes: Base64(SHA-1(key + GUID))
#[inline]
pub fn compute_accept_token(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    let hash = hasher.finalize();
    base64::engine::general_purpose::STANDARD.encode(hash)
}

/// Build the 101 Switching Protocols response
pub fn build_response(accept_token: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(128);

    buf.put_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
    buf.put_slice(b"Upgrade: websocket\r\n");
    buf.put_slice(b"Connection: Upgrade\r\n");
    buf.put_slice(b"Sec-WebSocket-Accept: ");
    buf.put_slice(accept_token.as_bytes());
    buf.put_slice(b"\r\n\r\n");

    buf.freeze()
}

/// Build the 400 Bad Request response sent on a rejected upgrade
pub fn build_rejection() -> Bytes {
    Bytes::from_static(BAD_REQUEST)
}

/// Build a WebSocket upgrade request (client-side)
pub fn build_request(host: &str, path: &str, key: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(256);

    buf.put_slice(b"GET ");
    buf.put_slice(path.as_bytes());
    buf.put_slice(b" HTTP/1.1\r\n");
    buf.put_slice(b"Host: ");
    buf.put_slice(host.as_bytes());
    buf.put_slice(b"\r\n");
    buf.put_slice(b"Upgrade: websocket\r\n");
    buf.put_slice(b"Connection: Upgrade\r\n");
    buf.put_slice(b"Sec-WebSocket-Key: ");
    buf.put_slice(key.as_bytes());
    buf.put_slice(b"\r\n");
    buf.put_slice(b"Sec-WebSocket-Version: 13\r\n");
    buf.put_slice(b"\r\n");

    buf.freeze()
}

/// Generate a random WebSocket key (client-side)
///
/// 16 bytes from the thread-local CSPRNG, base64 encoded.
pub fn generate_key() -> String {
    let bytes: [u8; 16] = rand::random();
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// WebSocket handshake response (client-side parsing)
#[derive(Debug)]
pub struct HandshakeResponse<'a> {
    /// HTTP status code
    pub status: u16,
    /// The Sec-WebSocket-Accept header
    pub accept: Option<&'a str>,
}

/// Parse a WebSocket upgrade response (client-side)
///
/// Anything other than 101 is a rejected handshake.
pub fn parse_response(buf: &[u8]) -> Result<Option<(HandshakeResponse<'_>, usize)>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut res = httparse::Response::new(&mut headers);

    match res.parse(buf) {
        Ok(httparse::Status::Complete(len)) => {
            let status = res.code.unwrap_or(0);
            if status != 101 {
                return Err(Error::HandshakeRejected("expected 101 Switching Protocols"));
            }

            let mut accept = None;
            for header in res.headers.iter() {
                if header.name.eq_ignore_ascii_case("sec-websocket-accept") {
                    let value = std::str::from_utf8(header.value)
                        .map_err(|_| Error::InvalidHttp("invalid header value"))?;
                    accept = Some(value.trim());
                }
            }

            Ok(Some((HandshakeResponse { status, accept }, len)))
        }
        Ok(httparse::Status::Partial) => Ok(None),
        Err(_) => Err(Error::InvalidHttp("failed to parse HTTP response")),
    }
}

/// Validate the server's accept token (client-side)
pub fn validate_accept_token(sent_key: &str, received_accept: &str) -> bool {
    compute_accept_token(sent_key).as_bytes() == received_accept.as_bytes()
}

/// Read one HTTP head (up to and including the blank line).
///
/// Consumes nothing past the blank line.
async fn read_head<S>(stream: &mut S, max_header_size: usize) -> Result<Vec<u8>>
where
    S: AsyncBufRead + Unpin,
{
    let mut head = Vec::with_capacity(512);

    loop {
        let line_start = head.len();
        // One byte past the limit is enough to detect an oversized head
        let budget = (max_header_size.saturating_sub(head.len()) + 1) as u64;
        let n = (&mut *stream)
            .take(budget)
            .read_until(b'\n', &mut head)
            .await?;
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }
        if head.len() > max_header_size {
            return Err(Error::InvalidHttp("request too large"));
        }

        let line = &head[line_start..];
        if line == b"\r\n" || line == b"\n" {
            return Ok(head);
        }
    }
}

/// Result of a successful handshake
#[derive(Debug, Clone)]
pub struct HandshakeResult {
    /// The request path
    pub path: String,
    /// The Host header (server) or the host connected to (client)
    pub host: Option<String>,
}

/// Perform server-side handshake
///
/// On a rejected upgrade or a malformed head a 400 response is written
/// before the error is returned; the caller then drops the connection.
pub async fn server_handshake<S>(stream: &mut S, max_header_size: usize) -> Result<HandshakeResult>
where
    S: AsyncBufRead + AsyncWrite + Unpin,
{
    let head = read_head(stream, max_header_size).await?;

    let req = match parse_request(&head) {
        Ok(Some((req, _))) => req,
        Ok(None) => return Err(Error::InvalidHttp("incomplete request head")),
        Err(e) => {
            warn!(error = %e, "rejecting malformed request head");
            stream.write_all(&build_rejection()).await?;
            stream.flush().await?;
            return Err(e);
        }
    };

    let rejection = if !is_upgrade_request(&req) {
        Some("missing Upgrade: websocket / Connection: Upgrade")
    } else if req.key.is_none_or(|k| k.trim().is_empty()) {
        Some("missing Sec-WebSocket-Key")
    } else {
        None
    };

    if let Some(reason) = rejection {
        warn!(path = req.path, reason, "rejecting upgrade request");
        stream.write_all(&build_rejection()).await?;
        stream.flush().await?;
        return Err(Error::HandshakeRejected(reason));
    }

    let key = req.key.unwrap_or_default().trim();
    let accept_token = compute_accept_token(key);

    stream.write_all(&build_response(&accept_token)).await?;
    stream.flush().await?;

    debug!(path = req.path, "upgrade accepted");

    Ok(HandshakeResult {
        path: req.path.to_string(),
        host: req.host.map(String::from),
    })
}

/// Perform client-side handshake
///
/// Fails with `AcceptTokenMismatch` when the server's token does not match
/// the one computed from the key we sent.
pub async fn client_handshake<S>(
    stream: &mut S,
    host: &str,
    path: &str,
    max_header_size: usize,
) -> Result<HandshakeResult>
where
    S: AsyncBufRead + AsyncWrite + Unpin,
{
    let key = generate_key();
    let request = build_request(host, path, &key);

    stream.write_all(&request).await?;
    stream.flush().await?;

    let head = read_head(stream, max_header_size).await?;
    let (res, _) =
        parse_response(&head)?.ok_or(Error::InvalidHttp("incomplete response head"))?;

    let accept = res.accept.unwrap_or_default();
    if !validate_accept_token(&key, accept) {
        warn!(host, received = accept, "Sec-WebSocket-Accept mismatch");
        return Err(Error::AcceptTokenMismatch);
    }

    debug!(host, path, status = res.status, "upgrade completed");

    Ok(HandshakeResult {
        path: path.to_string(),
        host: Some(host.to_string()),
    })
}
