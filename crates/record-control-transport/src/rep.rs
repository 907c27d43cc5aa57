//! ZMTP `REP` responder socket.
//!
//! Serves a single connected requester: receive a request, send exactly one
//! reply, repeat.

use std::time::Duration;

use bytes::Bytes;
use futures::SinkExt;
use record_control_core::TransportError;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream},
};
use tokio_util::codec::Framed;

use crate::{
    codec::FrameCodec,
    protocol::{self, SocketType},
};

/// Reply socket bound to one connected requester.
pub struct RepSocket<S = TcpStream> {
    framed: Framed<S, FrameCodec>,
    peer: String,
    envelope: Option<Vec<Bytes>>,
}

impl RepSocket<TcpStream> {
    /// Accept the next connection on `listener` and perform the handshake.
    ///
    /// # Errors
    /// Returns error if accepting fails or the peer is not a `REQ`/`DEALER`.
    pub async fn accept(listener: &TcpListener, timeout: Duration) -> Result<Self, TransportError> {
        let (stream, addr) = listener.accept().await?;
        stream.set_nodelay(true)?;
        Self::handshake(stream, addr.to_string(), timeout).await
    }
}

impl<S> RepSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Perform the ZMTP handshake over an already connected stream.
    ///
    /// # Errors
    /// Returns error if the handshake fails.
    pub async fn handshake(stream: S, peer: String, timeout: Duration) -> Result<Self, TransportError> {
        let (framed, peer_type) = protocol::handshake(stream, SocketType::Rep, timeout).await?;
        tracing::debug!("Accepted {} socket from {}", peer_type.as_str(), peer);
        Ok(Self {
            framed,
            peer,
            envelope: None,
        })
    }

    /// Remote address of the requester.
    #[must_use]
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Wait for the next request.
    ///
    /// Returns `None` when the requester disconnects.
    ///
    /// # Errors
    /// Returns `TransportError::ReplyOutstanding` if the previous request has
    /// not been answered, or a protocol error if the request carries no
    /// envelope delimiter.
    pub async fn recv_request(&mut self) -> Result<Option<Bytes>, TransportError> {
        if self.envelope.is_some() {
            return Err(TransportError::ReplyOutstanding);
        }

        let Some(mut parts) = protocol::read_message(&mut self.framed).await? else {
            return Ok(None);
        };

        let delimiter = parts
            .iter()
            .position(Bytes::is_empty)
            .ok_or_else(|| TransportError::Protocol("request without delimiter".to_string()))?;
        let body: Vec<Bytes> = parts.split_off(delimiter + 1);
        self.envelope = Some(parts);

        Ok(Some(Bytes::from(body.concat())))
    }

    /// Send the reply to the current request.
    ///
    /// # Errors
    /// Returns `TransportError::NoRequestOutstanding` if no request is
    /// waiting for a reply.
    pub async fn send_reply(&mut self, reply: Bytes) -> Result<(), TransportError> {
        let envelope = self
            .envelope
            .take()
            .ok_or(TransportError::NoRequestOutstanding)?;
        protocol::write_message(&mut self.framed, envelope.into_iter().chain([reply])).await
    }

    /// Close the connection.
    ///
    /// # Errors
    /// Returns error if flushing or shutting down the stream fails.
    pub async fn close(mut self) -> Result<(), TransportError> {
        self.framed.close().await
    }
}
