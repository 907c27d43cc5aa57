//! Core trait for request-reply transports.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use uuid::Uuid;

/// Session identifier.
pub type SessionId = Uuid;

/// Transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Handshake failed: {0}")]
    Handshake(String),
    #[error("Incompatible peer socket type: {0}")]
    IncompatiblePeer(String),
    #[error("Protocol violation: {0}")]
    Protocol(String),
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: u64, max: usize },
    #[error("Malformed reply: {0}")]
    MalformedReply(String),
    #[error("A reply is still outstanding")]
    ReplyOutstanding,
    #[error("No request is outstanding")]
    NoRequestOutstanding,
    #[error("Connection closed")]
    Closed,
}

/// Trait for request-reply transports.
///
/// Implementations enforce strict alternation: `send` fails with
/// `TransportError::ReplyOutstanding` until the reply to the previous
/// request has been received.
#[async_trait]
pub trait Transport: Send {
    /// Human-readable description of the remote peer.
    fn peer(&self) -> &str;

    /// Send one request.
    async fn send(&mut self, request: Bytes) -> Result<(), TransportError>;

    /// Wait for the reply to the outstanding request.
    async fn recv(&mut self) -> Result<Bytes, TransportError>;

    /// Release the connection.
    async fn close(&mut self) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    fn peer(&self) -> &str {
        (**self).peer()
    }

    async fn send(&mut self, request: Bytes) -> Result<(), TransportError> {
        (**self).send(request).await
    }

    async fn recv(&mut self) -> Result<Bytes, TransportError> {
        (**self).recv().await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        (**self).close().await
    }
}
