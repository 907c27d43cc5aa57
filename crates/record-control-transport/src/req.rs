//! ZMTP `REQ` client socket.

use async_trait::async_trait;
use bytes::Bytes;
use futures::SinkExt;
use record_control_core::{Endpoint, Transport, TransportError};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};
use tokio_util::codec::Framed;

use crate::{
    codec::FrameCodec,
    protocol::{self, SocketType},
};

/// Request socket: one request, then exactly one reply.
///
/// Each request goes out as an empty delimiter frame followed by the body;
/// each reply must start with the same empty delimiter.
pub struct ReqSocket<S = TcpStream> {
    framed: Framed<S, FrameCodec>,
    peer: String,
    awaiting_reply: bool,
    closed: bool,
}

impl ReqSocket<TcpStream> {
    /// Connect to `endpoint` and perform the ZMTP handshake.
    ///
    /// Both the TCP connect and the handshake are bounded by the endpoint
    /// timeout.
    ///
    /// # Errors
    /// Returns `TransportError::Connect` if the TCP connection cannot be
    /// established, or a handshake error if the peer is not a compatible
    /// ZMTP socket.
    pub async fn connect(endpoint: &Endpoint) -> Result<Self, TransportError> {
        let address = endpoint.address();
        let stream = tokio::time::timeout(endpoint.timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| TransportError::Connect {
                address: address.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("no connection within {:?}", endpoint.timeout),
                ),
            })?
            .map_err(|source| TransportError::Connect {
                address: address.clone(),
                source,
            })?;
        stream.set_nodelay(true)?;

        Self::handshake(stream, endpoint.to_string(), endpoint.timeout).await
    }
}

impl<S> ReqSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Perform the ZMTP handshake over an already connected stream.
    ///
    /// # Errors
    /// Returns error if the handshake fails or the peer is not `REP`/`ROUTER`.
    pub async fn handshake(
        stream: S,
        peer: String,
        timeout: std::time::Duration,
    ) -> Result<Self, TransportError> {
        let (framed, peer_type) = protocol::handshake(stream, SocketType::Req, timeout).await?;
        tracing::debug!("Connected to {} socket at {}", peer_type.as_str(), peer);
        Ok(Self {
            framed,
            peer,
            awaiting_reply: false,
            closed: false,
        })
    }
}

#[async_trait]
impl<S> Transport for ReqSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn peer(&self) -> &str {
        &self.peer
    }

    async fn send(&mut self, request: Bytes) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if self.awaiting_reply {
            return Err(TransportError::ReplyOutstanding);
        }
        protocol::write_message(&mut self.framed, [Bytes::new(), request]).await?;
        self.awaiting_reply = true;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Bytes, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if !self.awaiting_reply {
            return Err(TransportError::NoRequestOutstanding);
        }

        let parts = protocol::read_message(&mut self.framed)
            .await?
            .ok_or(TransportError::Closed)?;
        self.awaiting_reply = false;

        let mut parts = parts.into_iter();
        match parts.next() {
            Some(delimiter) if delimiter.is_empty() => {}
            _ => {
                return Err(TransportError::MalformedReply(
                    "reply does not start with an empty delimiter frame".to_string(),
                ));
            }
        }

        let body: Vec<Bytes> = parts.collect();
        match body.len() {
            0 => Err(TransportError::MalformedReply(
                "reply has no body frame".to_string(),
            )),
            1 => Ok(body.into_iter().next().unwrap_or_default()),
            _ => Ok(Bytes::from(body.concat())),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.awaiting_reply = false;
        tracing::debug!("Closing connection to {}", self.peer);
        self.framed.close().await
    }
}
