//! In-memory request-reply transport.
//!
//! `pair()` returns a `Transport` and the far end of the channel. The far
//! end plays the controller: it receives each request and decides what (if
//! anything) to reply.

use async_trait::async_trait;
use bytes::Bytes;
use record_control_core::{Transport, TransportError};
use tokio::{sync::mpsc, task::JoinHandle};

const PEER_NAME: &str = "channel";

/// Create a connected transport / peer pair.
#[must_use]
pub fn pair() -> (ChannelTransport, ChannelPeer) {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();

    let transport = ChannelTransport {
        request_tx: Some(request_tx),
        reply_rx,
        awaiting_reply: false,
    };
    let peer = ChannelPeer {
        request_rx,
        reply_tx,
    };
    (transport, peer)
}

/// Client side of the channel.
pub struct ChannelTransport {
    request_tx: Option<mpsc::UnboundedSender<Bytes>>,
    reply_rx: mpsc::UnboundedReceiver<Bytes>,
    awaiting_reply: bool,
}

#[async_trait]
impl Transport for ChannelTransport {
    fn peer(&self) -> &str {
        PEER_NAME
    }

    async fn send(&mut self, request: Bytes) -> Result<(), TransportError> {
        if self.awaiting_reply {
            return Err(TransportError::ReplyOutstanding);
        }
        let tx = self.request_tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(request).map_err(|_| TransportError::Closed)?;
        self.awaiting_reply = true;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Bytes, TransportError> {
        if !self.awaiting_reply {
            return Err(TransportError::NoRequestOutstanding);
        }
        let reply = self.reply_rx.recv().await.ok_or(TransportError::Closed)?;
        self.awaiting_reply = false;
        Ok(reply)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.request_tx = None;
        self.reply_rx.close();
        self.awaiting_reply = false;
        Ok(())
    }
}

/// Controller side of the channel.
pub struct ChannelPeer {
    request_rx: mpsc::UnboundedReceiver<Bytes>,
    reply_tx: mpsc::UnboundedSender<Bytes>,
}

impl ChannelPeer {
    /// Receive the next request. `None` once the transport is closed.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.request_rx.recv().await
    }

    /// Send a reply.
    ///
    /// # Errors
    /// Returns `TransportError::Closed` if the transport is gone.
    pub fn reply(&self, reply: impl Into<Bytes>) -> Result<(), TransportError> {
        self.reply_tx
            .send(reply.into())
            .map_err(|_| TransportError::Closed)
    }

    /// Answer requests with `respond` until the transport closes.
    ///
    /// `respond` returning `None` leaves that request unanswered. The task
    /// resolves to every request received, as text.
    pub fn spawn_responder<F>(mut self, mut respond: F) -> JoinHandle<Vec<String>>
    where
        F: FnMut(&str) -> Option<String> + Send + 'static,
    {
        tokio::spawn(async move {
            let mut received = Vec::new();
            while let Some(request) = self.recv().await {
                let text = String::from_utf8_lossy(&request).into_owned();
                if let Some(reply) = respond(&text) {
                    if self.reply(reply).is_err() {
                        received.push(text);
                        break;
                    }
                }
                received.push(text);
            }
            received
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_reply_through_channel() {
        let (mut transport, peer) = pair();
        let responder = peer.spawn_responder(|req| Some(format!("ACK:{req}")));

        transport.send(Bytes::from_static(b"StartRecord")).await.unwrap();
        assert_eq!(transport.recv().await.unwrap(), Bytes::from_static(b"ACK:StartRecord"));

        transport.close().await.unwrap();
        assert_eq!(responder.await.unwrap(), vec!["StartRecord".to_string()]);
    }

    #[tokio::test]
    async fn test_alternation_enforced() {
        let (mut transport, _peer) = pair();
        assert!(matches!(
            transport.recv().await,
            Err(TransportError::NoRequestOutstanding)
        ));

        transport.send(Bytes::from_static(b"one")).await.unwrap();
        assert!(matches!(
            transport.send(Bytes::from_static(b"two")).await,
            Err(TransportError::ReplyOutstanding)
        ));
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (mut transport, _peer) = pair();
        transport.close().await.unwrap();
        assert!(matches!(
            transport.send(Bytes::from_static(b"x")).await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_peer_gone_is_closed() {
        let (mut transport, peer) = pair();
        drop(peer);
        assert!(matches!(
            transport.send(Bytes::from_static(b"x")).await,
            Err(TransportError::Closed)
        ));
    }
}
