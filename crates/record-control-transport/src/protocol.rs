//! ZMTP 3.0 greeting and NULL-mechanism handshake.
//!
//! # Wire Format
//!
//! Each side first writes a fixed 64-byte greeting:
//!
//! ```text
//! +-----------+---------+------------------+-----------+--------------+
//! | signature | version | mechanism        | as-server | filler       |
//! | FF 0*8 7F | 03 00   | "NULL" + 16 * 00 | 00        | 31 * 00      |
//! +-----------+---------+------------------+-----------+--------------+
//! ```
//!
//! followed by a `READY` command frame carrying the `Socket-Type` property.
//! A peer may send an `ERROR` command instead to refuse the connection.

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use record_control_core::TransportError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Framed;

use crate::codec::{Frame, FrameCodec};

/// Greeting length in bytes.
pub const GREETING_LEN: usize = 64;

const SIGNATURE_HEAD: u8 = 0xFF;
const SIGNATURE_TAIL: u8 = 0x7F;
const VERSION_MAJOR: u8 = 3;
const VERSION_MINOR: u8 = 0;
const MECHANISM_LEN: usize = 20;
const MECHANISM_NULL: &str = "NULL";

const COMMAND_READY: &str = "READY";
const COMMAND_ERROR: &str = "ERROR";
const PROPERTY_SOCKET_TYPE: &str = "Socket-Type";

/// ZeroMQ socket types relevant to request-reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketType {
    Req,
    Rep,
    Dealer,
    Router,
}

impl SocketType {
    /// Name used in the `Socket-Type` property.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Req => "REQ",
            Self::Rep => "REP",
            Self::Dealer => "DEALER",
            Self::Router => "ROUTER",
        }
    }

    /// Parse a `Socket-Type` property value.
    #[must_use]
    pub fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"REQ" => Some(Self::Req),
            b"REP" => Some(Self::Rep),
            b"DEALER" => Some(Self::Dealer),
            b"ROUTER" => Some(Self::Router),
            _ => None,
        }
    }

    /// Whether a socket of this type may talk to `peer`.
    #[must_use]
    pub const fn accepts(self, peer: Self) -> bool {
        matches!(
            (self, peer),
            (Self::Req, Self::Rep | Self::Router) | (Self::Rep, Self::Req | Self::Dealer)
        )
    }
}

/// Parsed greeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    pub major: u8,
    pub minor: u8,
    pub mechanism: String,
    pub as_server: bool,
}

impl Greeting {
    /// Greeting for the NULL security mechanism.
    #[must_use]
    pub fn null() -> Self {
        Self {
            major: VERSION_MAJOR,
            minor: VERSION_MINOR,
            mechanism: MECHANISM_NULL.to_string(),
            as_server: false,
        }
    }

    /// Encode to the 64-byte wire form.
    #[must_use]
    pub fn encode(&self) -> [u8; GREETING_LEN] {
        let mut buf = [0u8; GREETING_LEN];
        buf[0] = SIGNATURE_HEAD;
        buf[9] = SIGNATURE_TAIL;
        buf[10] = self.major;
        buf[11] = self.minor;
        let mechanism = self.mechanism.as_bytes();
        let len = mechanism.len().min(MECHANISM_LEN);
        buf[12..12 + len].copy_from_slice(&mechanism[..len]);
        buf[32] = u8::from(self.as_server);
        buf
    }

    /// Parse a peer greeting.
    ///
    /// # Errors
    /// Returns `TransportError::Handshake` if the signature is wrong or the
    /// peer speaks a ZMTP version older than 3.
    pub fn parse(buf: &[u8; GREETING_LEN]) -> Result<Self, TransportError> {
        if buf[0] != SIGNATURE_HEAD || buf[9] != SIGNATURE_TAIL {
            return Err(TransportError::Handshake(
                "peer did not send a ZMTP signature".to_string(),
            ));
        }
        let major = buf[10];
        if major < VERSION_MAJOR {
            return Err(TransportError::Handshake(format!(
                "unsupported ZMTP version {major}.{}",
                buf[11]
            )));
        }
        let mechanism = &buf[12..12 + MECHANISM_LEN];
        let end = mechanism
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MECHANISM_LEN);
        Ok(Self {
            major,
            minor: buf[11],
            mechanism: String::from_utf8_lossy(&mechanism[..end]).into_owned(),
            as_server: buf[32] != 0,
        })
    }
}

/// A decoded command frame body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBody {
    pub name: String,
    pub data: Bytes,
}

impl CommandBody {
    /// Parse a command frame body: `name-len name data`.
    ///
    /// # Errors
    /// Returns `TransportError::Protocol` if the body is truncated.
    pub fn parse(body: &Bytes) -> Result<Self, TransportError> {
        let name_len = usize::from(
            *body
                .first()
                .ok_or_else(|| TransportError::Protocol("empty command frame".to_string()))?,
        );
        if body.len() < 1 + name_len {
            return Err(TransportError::Protocol(
                "truncated command name".to_string(),
            ));
        }
        Ok(Self {
            name: String::from_utf8_lossy(&body[1..=name_len]).into_owned(),
            data: body.slice(1 + name_len..),
        })
    }

    /// Metadata properties of a `READY` command.
    ///
    /// # Errors
    /// Returns `TransportError::Protocol` if a property is truncated.
    pub fn properties(&self) -> Result<Vec<(String, Bytes)>, TransportError> {
        let data = &self.data;
        let mut props = Vec::new();
        let mut pos = 0;
        while pos < data.len() {
            let name_len = usize::from(data[pos]);
            pos += 1;
            if data.len() < pos + name_len + 4 {
                return Err(TransportError::Protocol("truncated property".to_string()));
            }
            let name = String::from_utf8_lossy(&data[pos..pos + name_len]).into_owned();
            pos += name_len;
            let mut len = [0u8; 4];
            len.copy_from_slice(&data[pos..pos + 4]);
            pos += 4;
            let value_len = u32::from_be_bytes(len) as usize;
            if data.len() < pos + value_len {
                return Err(TransportError::Protocol(format!(
                    "truncated value for property {name}"
                )));
            }
            props.push((name, data.slice(pos..pos + value_len)));
            pos += value_len;
        }
        Ok(props)
    }

    /// Reason text of an `ERROR` command.
    #[must_use]
    pub fn error_reason(&self) -> String {
        let Some(&len) = self.data.first() else {
            return String::new();
        };
        let end = (1 + usize::from(len)).min(self.data.len());
        String::from_utf8_lossy(&self.data[1..end]).into_owned()
    }
}

/// Encode a `READY` command body announcing `socket_type`.
#[must_use]
pub fn ready_command(socket_type: SocketType) -> Bytes {
    let value = socket_type.as_str().as_bytes();
    let mut buf = BytesMut::new();
    put_short_str(&mut buf, COMMAND_READY);
    put_short_str(&mut buf, PROPERTY_SOCKET_TYPE);
    buf.put_u32(u32::try_from(value.len()).unwrap_or(u32::MAX));
    buf.put_slice(value);
    buf.freeze()
}

/// Encode an `ERROR` command body.
#[must_use]
pub fn error_command(reason: &str) -> Bytes {
    let mut buf = BytesMut::new();
    put_short_str(&mut buf, COMMAND_ERROR);
    put_short_str(&mut buf, reason);
    buf.freeze()
}

fn put_short_str(buf: &mut BytesMut, s: &str) {
    let bytes = &s.as_bytes()[..s.len().min(usize::from(u8::MAX))];
    buf.put_u8(u8::try_from(bytes.len()).unwrap_or(u8::MAX));
    buf.put_slice(bytes);
}

/// Exchange greetings and `READY` commands over a fresh stream.
///
/// Returns the framed stream and the peer's socket type.
///
/// # Errors
/// Returns error if the peer does not complete the handshake within
/// `timeout`, speaks an unsupported version or mechanism, refuses with an
/// `ERROR` command, or announces an incompatible socket type.
pub async fn handshake<S>(
    stream: S,
    local: SocketType,
    timeout: Duration,
) -> Result<(Framed<S, FrameCodec>, SocketType), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tokio::time::timeout(timeout, exchange(stream, local))
        .await
        .map_err(|_| TransportError::Handshake(format!("timed out after {timeout:?}")))?
}

async fn exchange<S>(
    mut stream: S,
    local: SocketType,
) -> Result<(Framed<S, FrameCodec>, SocketType), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(&Greeting::null().encode()).await?;
    stream.flush().await?;

    let mut buf = [0u8; GREETING_LEN];
    stream.read_exact(&mut buf).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            TransportError::Handshake("peer closed during greeting".to_string())
        } else {
            TransportError::Io(e)
        }
    })?;
    let greeting = Greeting::parse(&buf)?;
    if greeting.mechanism != MECHANISM_NULL {
        return Err(TransportError::Handshake(format!(
            "unsupported security mechanism {:?}",
            greeting.mechanism
        )));
    }
    tracing::debug!(
        "Peer greeting: ZMTP {}.{} {}",
        greeting.major,
        greeting.minor,
        greeting.mechanism
    );

    let mut framed = Framed::new(stream, FrameCodec::new());
    framed.send(Frame::command(ready_command(local))).await?;

    let frame = framed
        .next()
        .await
        .ok_or_else(|| TransportError::Handshake("peer closed before READY".to_string()))??;
    if !frame.command {
        return Err(TransportError::Handshake(
            "expected READY command, got message frame".to_string(),
        ));
    }

    let command = CommandBody::parse(&frame.body)?;
    match command.name.as_str() {
        COMMAND_READY => {
            let peer = peer_socket_type(&command)?;
            if !local.accepts(peer) {
                let reason = format!("{} cannot talk to {}", local.as_str(), peer.as_str());
                let _ = framed.send(Frame::command(error_command(&reason))).await;
                return Err(TransportError::IncompatiblePeer(reason));
            }
            Ok((framed, peer))
        }
        COMMAND_ERROR => Err(TransportError::Handshake(format!(
            "peer refused connection: {}",
            command.error_reason()
        ))),
        other => Err(TransportError::Handshake(format!(
            "unexpected command {other:?} during handshake"
        ))),
    }
}

fn peer_socket_type(command: &CommandBody) -> Result<SocketType, TransportError> {
    let props = command.properties()?;
    let (_, value) = props
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(PROPERTY_SOCKET_TYPE))
        .ok_or_else(|| TransportError::Handshake("READY without Socket-Type".to_string()))?;
    SocketType::from_name(value).ok_or_else(|| {
        TransportError::IncompatiblePeer(String::from_utf8_lossy(value).into_owned())
    })
}

/// Read one complete multi-part message.
///
/// Command frames between messages are skipped, except `ERROR`, which ends
/// the connection. Returns `None` if the peer closes cleanly between
/// messages.
///
/// # Errors
/// Returns error on I/O failure, a peer `ERROR`, or a close in the middle of
/// a message.
pub async fn read_message<S>(
    framed: &mut Framed<S, FrameCodec>,
) -> Result<Option<Vec<Bytes>>, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut parts = Vec::new();
    loop {
        let Some(frame) = framed.next().await.transpose()? else {
            if parts.is_empty() {
                return Ok(None);
            }
            return Err(TransportError::Protocol(
                "connection closed in the middle of a message".to_string(),
            ));
        };

        if frame.command {
            let command = CommandBody::parse(&frame.body)?;
            if command.name == COMMAND_ERROR {
                return Err(TransportError::Protocol(format!(
                    "peer sent ERROR: {}",
                    command.error_reason()
                )));
            }
            tracing::debug!("Ignoring {} command from peer", command.name);
            continue;
        }

        parts.push(frame.body);
        if !frame.more {
            return Ok(Some(parts));
        }
    }
}

/// Write one multi-part message and flush it.
///
/// # Errors
/// Returns error if a part is too large or the write fails.
pub async fn write_message<S, I>(
    framed: &mut Framed<S, FrameCodec>,
    parts: I,
) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    I: IntoIterator<Item = Bytes>,
{
    let mut parts = parts.into_iter().peekable();
    while let Some(part) = parts.next() {
        let more = parts.peek().is_some();
        framed.feed(Frame::message(part, more)).await?;
    }
    framed.flush().await
}
