//! Command session: one connection, one outstanding command at a time.

use std::{sync::Arc, time::Duration};

use record_control_core::{
    Command, Endpoint, EventStore, Pacing, Reply, Sequence, SessionEvent, SessionId, Transport,
    TransportError,
};
use record_control_transport::ReqSocket;
use tokio::time::Instant;
use uuid::Uuid;

use crate::{
    abort::AbortHandle,
    error::{SequenceError, SequenceStep, SessionError, StepPhase},
};

/// A reply together with the step that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReply {
    pub step: SequenceStep,
    pub reply: Reply,
}

/// Outcome of a completed sequence.
#[derive(Debug, Clone)]
pub struct SequenceReport {
    /// Every reply in the order received, shutdown last.
    pub replies: Vec<StepReply>,
    /// Wall time from the first send to the shutdown reply.
    pub elapsed: Duration,
}

impl SequenceReport {
    /// Reply to the final shutdown command.
    #[must_use]
    pub fn shutdown_reply(&self) -> Option<&Reply> {
        self.replies
            .last()
            .filter(|r| r.step.phase == StepPhase::Shutdown)
            .map(|r| &r.reply)
    }
}

/// Request-reply session with a remote controller.
///
/// `execute` takes `&mut self`, so a second command cannot be issued while
/// a reply is outstanding. The first failure closes the session; later
/// calls return `SessionError::Closed`.
pub struct CommandSession<T = ReqSocket>
where
    T: Transport,
{
    id: SessionId,
    transport: Option<T>,
    peer: String,
    timeout: Duration,
    abort: AbortHandle,
    events: Arc<EventStore>,
}

impl CommandSession<ReqSocket> {
    /// Connect to a controller over ZMTP.
    ///
    /// # Errors
    /// Returns `SessionError::Connection` if the connection or handshake
    /// fails.
    pub async fn connect(endpoint: &Endpoint) -> Result<Self, SessionError> {
        tracing::info!("Connecting to {endpoint}");
        let transport =
            ReqSocket::connect(endpoint)
                .await
                .map_err(|source| SessionError::Connection {
                    peer: endpoint.to_string(),
                    source,
                })?;
        Ok(Self::with_transport(transport, endpoint.timeout))
    }
}

impl<T> CommandSession<T>
where
    T: Transport,
{
    /// Create a session over an already connected transport.
    #[must_use]
    pub fn with_transport(transport: T, timeout: Duration) -> Self {
        let peer = transport.peer().to_string();
        let id = Uuid::new_v4();
        let events = Arc::new(EventStore::new());
        events.push(SessionEvent::Connected { peer: peer.clone() });
        tracing::info!(session = %id, "Session open with {peer}");

        Self {
            id,
            transport: Some(transport),
            peer,
            timeout,
            abort: AbortHandle::new(),
            events,
        }
    }

    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Description of the remote peer.
    #[must_use]
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Maximum wait for each reply.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Event history for this session.
    #[must_use]
    pub fn events(&self) -> Arc<EventStore> {
        Arc::clone(&self.events)
    }

    /// Handle that aborts this session from another task.
    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Whether the connection has been released.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.transport.is_none()
    }

    /// Send one command and wait for its reply.
    ///
    /// # Errors
    /// Returns `Timeout` if no reply arrives in time, `MalformedReply` if the
    /// reply cannot be decoded, `Connection` on transport failure, `Aborted`
    /// if the abort handle fires, and `Closed` if the session already ended.
    /// Every error except `Closed` closes the session.
    pub async fn execute(&mut self, command: &Command) -> Result<Reply, SessionError> {
        let result = self.exchange(command).await;
        if let Err(err) = &result {
            self.fail(err);
        }
        result
    }

    async fn exchange(&mut self, command: &Command) -> Result<Reply, SessionError> {
        let timeout = self.timeout;
        let transport = self.transport.as_mut().ok_or(SessionError::Closed)?;
        if self.abort.is_aborted() {
            return Err(SessionError::Aborted {
                during: format!("before sending \"{command}\""),
            });
        }
        let timed_out = || SessionError::Timeout {
            command: command.to_string(),
            timeout,
        };

        // One deadline covers both the send and the reply.
        let deadline = Instant::now() + timeout;

        tracing::info!(session = %self.id, "Sending: {command}");
        tokio::select! {
            biased;
            () = self.abort.aborted() => {
                return Err(SessionError::Aborted {
                    during: format!("while sending \"{command}\""),
                });
            }
            sent = tokio::time::timeout_at(deadline, transport.send(command.to_payload())) => match sent {
                Err(_) => return Err(timed_out()),
                Ok(Err(source)) => return Err(classify(&self.peer, command, source)),
                Ok(Ok(())) => {}
            }
        }
        self.events.push(SessionEvent::CommandSent {
            command: command.to_string(),
        });

        let payload = tokio::select! {
            biased;
            () = self.abort.aborted() => {
                return Err(SessionError::Aborted {
                    during: format!("waiting for reply to \"{command}\""),
                });
            }
            received = tokio::time::timeout_at(deadline, transport.recv()) => match received {
                Err(_) => return Err(timed_out()),
                Ok(Err(source)) => return Err(classify(&self.peer, command, source)),
                Ok(Ok(payload)) => payload,
            }
        };

        let reply = Reply::decode(payload).map_err(|e| SessionError::MalformedReply {
            command: command.to_string(),
            reason: e.to_string(),
        })?;
        tracing::info!(session = %self.id, "Reply to {command}: {reply}");
        self.events.push(SessionEvent::ReplyReceived {
            command: command.to_string(),
            reply: reply.text().to_string(),
        });
        Ok(reply)
    }

    /// Run a full sequence: for each pair, `start`, pause `start_delay`,
    /// `stop`, pause `stop_delay`; then the shutdown command.
    ///
    /// # Errors
    /// Stops at the first failure and returns it with the step it happened
    /// at. The session is closed in that case.
    pub async fn run_sequence(
        &mut self,
        sequence: &Sequence,
        pacing: Pacing,
    ) -> Result<SequenceReport, SequenceError> {
        self.run_sequence_with(sequence, pacing, |_, _| {}).await
    }

    /// Like `run_sequence`, calling `on_reply` as each reply arrives.
    ///
    /// # Errors
    /// See `run_sequence`.
    pub async fn run_sequence_with<F>(
        &mut self,
        sequence: &Sequence,
        pacing: Pacing,
        mut on_reply: F,
    ) -> Result<SequenceReport, SequenceError>
    where
        F: FnMut(&SequenceStep, &Reply),
    {
        let started = Instant::now();
        let mut replies = Vec::with_capacity(sequence.request_count());
        tracing::info!(
            session = %self.id,
            "Running {} command pairs ({} requests)",
            sequence.pairs().len(),
            sequence.request_count()
        );

        for (index, pair) in sequence.pairs().iter().enumerate() {
            let pair_no = index + 1;
            for (phase, command, delay) in [
                (StepPhase::Start, &pair.start, pacing.start_delay),
                (StepPhase::Stop, &pair.stop, pacing.stop_delay),
            ] {
                let step = SequenceStep {
                    pair: pair_no,
                    phase,
                    command: command.to_string(),
                };
                let reply = self.run_step(&step, command).await?;
                on_reply(&step, &reply);
                replies.push(StepReply { step: step.clone(), reply });

                if let Err(source) = self.pause(delay, command).await {
                    return Err(SequenceError { step, source });
                }
            }
        }

        let shutdown = sequence.shutdown();
        let step = SequenceStep {
            pair: sequence.pairs().len() + 1,
            phase: StepPhase::Shutdown,
            command: shutdown.to_string(),
        };
        let reply = self.run_step(&step, shutdown).await?;
        on_reply(&step, &reply);
        replies.push(StepReply { step, reply });

        let elapsed = started.elapsed();
        tracing::info!(session = %self.id, "Sequence complete in {elapsed:?}");
        Ok(SequenceReport { replies, elapsed })
    }

    async fn run_step(
        &mut self,
        step: &SequenceStep,
        command: &Command,
    ) -> Result<Reply, SequenceError> {
        self.execute(command).await.map_err(|source| {
            tracing::error!(session = %self.id, "Sequence aborted at {step}: {source}");
            SequenceError {
                step: step.clone(),
                source,
            }
        })
    }

    async fn pause(&mut self, delay: Duration, after: &Command) -> Result<(), SessionError> {
        if self.transport.is_none() {
            return Err(SessionError::Closed);
        }
        if delay.is_zero() {
            return Ok(());
        }

        self.events.push(SessionEvent::Paused {
            millis: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        });
        tracing::debug!(session = %self.id, "Pausing {delay:?} after {after}");

        let result = tokio::select! {
            biased;
            () = self.abort.aborted() => Err(SessionError::Aborted {
                during: format!("pausing after \"{after}\""),
            }),
            () = tokio::time::sleep(delay) => Ok(()),
        };
        if let Err(err) = &result {
            self.fail(err);
        }
        result
    }

    fn fail(&mut self, err: &SessionError) {
        if matches!(err, SessionError::Closed) {
            return;
        }
        tracing::error!(session = %self.id, "Session failed: {err}");
        self.events.push(SessionEvent::Failed {
            message: err.to_string(),
        });
        self.discard();
    }

    /// Drop the connection without flushing. A failed exchange may have
    /// left a partial request queued for a peer that no longer reads.
    fn discard(&mut self) {
        if self.transport.take().is_some() {
            self.events.push(SessionEvent::Closed);
            tracing::info!(session = %self.id, "Session closed, connection dropped");
        }
    }

    /// Release the connection. Safe to call more than once.
    ///
    /// The orderly close is bounded by the session timeout and by the abort
    /// handle; past either, the connection is dropped as is.
    pub async fn close(&mut self) {
        let Some(mut transport) = self.transport.take() else {
            return;
        };
        let timeout = self.timeout;
        tokio::select! {
            biased;
            () = self.abort.aborted() => {
                tracing::warn!(session = %self.id, "Aborted while closing, dropping connection");
            }
            closed = tokio::time::timeout(timeout, transport.close()) => match closed {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(session = %self.id, "Error while closing connection: {e}");
                }
                Err(_) => {
                    tracing::warn!(
                        session = %self.id,
                        "Connection did not close within {timeout:?}, dropping it"
                    );
                }
            }
        }
        drop(transport);
        self.events.push(SessionEvent::Closed);
        tracing::info!(session = %self.id, "Session closed");
    }
}

impl<T> Drop for CommandSession<T>
where
    T: Transport,
{
    fn drop(&mut self) {
        if self.transport.take().is_some() {
            self.events.push(SessionEvent::Closed);
            tracing::debug!(session = %self.id, "Session dropped; connection released");
        }
    }
}

fn classify(peer: &str, command: &Command, source: TransportError) -> SessionError {
    match source {
        TransportError::MalformedReply(reason) => SessionError::MalformedReply {
            command: command.to_string(),
            reason,
        },
        source => SessionError::Connection {
            peer: peer.to_string(),
            source,
        },
    }
}

#[cfg(test)]
mod tests {
    use record_control_transport::channel;

    use super::*;

    fn cmd(text: &str) -> Command {
        Command::parse(text).unwrap()
    }

    #[tokio::test]
    async fn test_execute_returns_reply_unmodified() {
        let (transport, peer) = channel::pair();
        let _responder = peer.spawn_responder(|req| Some(format!("ACK:{req}")));
        let mut session = CommandSession::with_transport(transport, Duration::from_secs(1));

        let reply = session.execute(&cmd("StartRecord Dir=/tmp/out")).await.unwrap();
        assert_eq!(reply.text(), "ACK:StartRecord Dir=/tmp/out");
        assert!(!session.is_closed());
    }

    #[tokio::test]
    async fn test_closed_session_refuses_commands() {
        let (transport, _peer) = channel::pair();
        let mut session = CommandSession::with_transport(transport, Duration::from_secs(1));
        session.close().await;
        session.close().await;

        assert!(session.is_closed());
        assert!(matches!(
            session.execute(&cmd("StopRecord")).await,
            Err(SessionError::Closed)
        ));
        let closes = session
            .events()
            .history()
            .into_iter()
            .filter(|e| *e == SessionEvent::Closed)
            .count();
        assert_eq!(closes, 1);
    }

    #[tokio::test]
    async fn test_peer_disconnect_is_connection_error() {
        let (transport, peer) = channel::pair();
        drop(peer);
        let mut session = CommandSession::with_transport(transport, Duration::from_secs(1));

        let err = session.execute(&cmd("StartRecord")).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Connection {
                source: TransportError::Closed,
                ..
            }
        ));
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn test_invalid_utf8_reply_is_malformed() {
        let (transport, mut peer) = channel::pair();
        tokio::spawn(async move {
            while peer.recv().await.is_some() {
                let _ = peer.reply(vec![0xff, 0xfe]);
            }
        });
        let mut session = CommandSession::with_transport(transport, Duration::from_secs(1));

        let err = session.execute(&cmd("StopRecord")).await.unwrap_err();
        assert!(matches!(err, SessionError::MalformedReply { ref command, .. } if command == "StopRecord"));
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn test_dropping_session_emits_closed() {
        let (transport, _peer) = channel::pair();
        let session = CommandSession::with_transport(transport, Duration::from_secs(1));
        let events = session.events();
        drop(session);
        assert_eq!(events.history().last(), Some(&SessionEvent::Closed));
    }
}
