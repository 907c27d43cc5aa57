//! Sequencing, pacing and timeout behaviour against mock controllers.
//!
//! Timing tests run on a paused clock, so delays and timeouts are exact.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use record_control_core::{Command, Pacing, Sequence, SessionEvent, Transport, TransportError};
use record_control_session::{CommandSession, SessionError, StepPhase};
use record_control_transport::channel;
use tokio::time::Instant;

const TIMEOUT: Duration = Duration::from_secs(1);
const START_DELAY: Duration = Duration::from_secs(5);
const STOP_DELAY: Duration = Duration::from_secs(1);

fn cmd(text: &str) -> Command {
    Command::parse(text).unwrap()
}

fn sequence(starts: &[&str]) -> Sequence {
    Sequence::from_starts(
        starts.iter().map(|s| cmd(s)),
        &cmd("StopRecord"),
        cmd("StopAcquisition"),
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum WireEvent {
    Sent(String, Instant),
    Replied(String, Instant),
}

/// Mock controller that records every exchange and asserts that no two
/// requests are ever outstanding at once.
struct ScriptedTransport {
    log: Arc<Mutex<Vec<WireEvent>>>,
    outstanding: Option<String>,
    respond: fn(&str) -> Option<String>,
    send_delay: Duration,
    close_delay: Duration,
}

impl ScriptedTransport {
    fn new(respond: fn(&str) -> Option<String>) -> (Self, Arc<Mutex<Vec<WireEvent>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let transport = Self {
            log: Arc::clone(&log),
            outstanding: None,
            respond,
            send_delay: Duration::ZERO,
            close_delay: Duration::ZERO,
        };
        (transport, log)
    }

    fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    fn with_close_delay(mut self, delay: Duration) -> Self {
        self.close_delay = delay;
        self
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn peer(&self) -> &str {
        "scripted"
    }

    async fn send(&mut self, request: Bytes) -> Result<(), TransportError> {
        if !self.send_delay.is_zero() {
            tokio::time::sleep(self.send_delay).await;
        }
        let text = String::from_utf8(request.to_vec()).unwrap();
        assert!(
            self.outstanding.is_none(),
            "sent {text:?} while {:?} was still outstanding",
            self.outstanding
        );
        self.log
            .lock()
            .unwrap()
            .push(WireEvent::Sent(text.clone(), Instant::now()));
        self.outstanding = Some(text);
        Ok(())
    }

    async fn recv(&mut self) -> Result<Bytes, TransportError> {
        let request = self.outstanding.clone().expect("recv without request");
        match (self.respond)(&request) {
            Some(reply) => {
                self.outstanding = None;
                self.log
                    .lock()
                    .unwrap()
                    .push(WireEvent::Replied(reply.clone(), Instant::now()));
                Ok(Bytes::from(reply))
            }
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        tokio::time::sleep(self.close_delay).await;
        Ok(())
    }
}

fn always_ok(_: &str) -> Option<String> {
    Some("OK".to_string())
}

fn echo(request: &str) -> Option<String> {
    Some(format!("ACK:{request}"))
}

fn never(_: &str) -> Option<String> {
    None
}

fn sent(log: &Mutex<Vec<WireEvent>>) -> Vec<String> {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            WireEvent::Sent(text, _) => Some(text.clone()),
            WireEvent::Replied(..) => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_sequence_issues_two_n_plus_one_requests_in_order() {
    let (transport, log) = ScriptedTransport::new(always_ok);
    let mut session = CommandSession::with_transport(transport, TIMEOUT);

    let seq = sequence(&["StartRecord A=1", "StartRecord A=2", "StartRecord A=3"]);
    let report = session
        .run_sequence(&seq, Pacing::new(START_DELAY, STOP_DELAY))
        .await
        .unwrap();

    assert_eq!(
        sent(&log),
        vec![
            "StartRecord A=1",
            "StopRecord",
            "StartRecord A=2",
            "StopRecord",
            "StartRecord A=3",
            "StopRecord",
            "StopAcquisition",
        ]
    );
    assert_eq!(report.replies.len(), 7);
    assert!(report.replies.iter().all(|r| r.reply.text() == "OK"));
    assert_eq!(report.replies[6].step.phase, StepPhase::Shutdown);
}

#[tokio::test(start_paused = true)]
async fn test_strict_alternation_of_send_and_reply() {
    let (transport, log) = ScriptedTransport::new(always_ok);
    let mut session = CommandSession::with_transport(transport, TIMEOUT);

    session
        .run_sequence(&sequence(&["StartRecord", "StartRecord"]), Pacing::none())
        .await
        .unwrap();

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 10);
    for (i, event) in log.iter().enumerate() {
        let expect_send = i % 2 == 0;
        assert_eq!(
            matches!(event, WireEvent::Sent(..)),
            expect_send,
            "event {i} out of order: {event:?}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_never_replying_peer_times_out_and_stops() {
    let (transport, log) = ScriptedTransport::new(never);
    let mut session = CommandSession::with_transport(transport, TIMEOUT);

    let started = Instant::now();
    let err = session
        .run_sequence(
            &sequence(&["StartRecord A=1", "StartRecord A=2"]),
            Pacing::new(START_DELAY, STOP_DELAY),
        )
        .await
        .unwrap_err();

    assert_eq!(started.elapsed(), TIMEOUT);
    assert_eq!(err.step.pair, 1);
    assert_eq!(err.step.phase, StepPhase::Start);
    assert_eq!(err.step.command, "StartRecord A=1");
    assert!(err.source.is_timeout());
    assert_eq!(sent(&log), vec!["StartRecord A=1"]);
    assert!(session.is_closed());

    assert!(matches!(
        session.execute(&cmd("StopRecord")).await,
        Err(SessionError::Closed)
    ));
    assert_eq!(sent(&log).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_send_and_reply_share_one_deadline() {
    let (transport, log) = ScriptedTransport::new(never);
    let transport = transport.with_send_delay(Duration::from_millis(600));
    let mut session = CommandSession::with_transport(transport, TIMEOUT);

    let started = Instant::now();
    let err = session.execute(&cmd("StartRecord")).await.unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(started.elapsed(), TIMEOUT);
    assert_eq!(sent(&log), vec!["StartRecord"]);
}

#[tokio::test(start_paused = true)]
async fn test_send_that_never_completes_times_out() {
    let (transport, log) = ScriptedTransport::new(always_ok);
    let transport = transport.with_send_delay(Duration::from_secs(3600));
    let mut session = CommandSession::with_transport(transport, TIMEOUT);

    let started = Instant::now();
    let err = session.execute(&cmd("StartRecord")).await.unwrap_err();

    assert!(err.is_timeout());
    assert_eq!(started.elapsed(), TIMEOUT);
    assert!(sent(&log).is_empty());
    assert!(session.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_close_is_bounded_when_transport_hangs() {
    let (transport, _log) = ScriptedTransport::new(always_ok);
    let transport = transport.with_close_delay(Duration::from_secs(3600));
    let mut session = CommandSession::with_transport(transport, TIMEOUT);
    let events = session.events();

    let started = Instant::now();
    session.close().await;

    assert_eq!(started.elapsed(), TIMEOUT);
    assert!(session.is_closed());
    assert_eq!(events.history().last(), Some(&SessionEvent::Closed));
}

#[tokio::test(start_paused = true)]
async fn test_abort_unblocks_close() {
    let (transport, _log) = ScriptedTransport::new(always_ok);
    let transport = transport.with_close_delay(Duration::from_secs(3600));
    let mut session = CommandSession::with_transport(transport, TIMEOUT);
    let abort = session.abort_handle();

    let started = Instant::now();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        abort.abort();
    });
    session.close().await;

    assert_eq!(started.elapsed(), Duration::from_millis(100));
    assert!(session.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_pacing_between_commands() {
    let (transport, log) = ScriptedTransport::new(always_ok);
    let mut session = CommandSession::with_transport(transport, TIMEOUT);

    session
        .run_sequence(
            &sequence(&["StartRecord A=1", "StartRecord A=2"]),
            Pacing::new(START_DELAY, STOP_DELAY),
        )
        .await
        .unwrap();

    let log = log.lock().unwrap();
    let gaps: Vec<(String, Duration)> = log
        .windows(2)
        .filter_map(|w| match (&w[0], &w[1]) {
            (WireEvent::Replied(_, at), WireEvent::Sent(next, sent_at)) => {
                Some((next.clone(), *sent_at - *at))
            }
            _ => None,
        })
        .collect();

    assert_eq!(
        gaps,
        vec![
            ("StopRecord".to_string(), START_DELAY),
            ("StartRecord A=2".to_string(), STOP_DELAY),
            ("StopRecord".to_string(), START_DELAY),
            ("StopAcquisition".to_string(), STOP_DELAY),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_identical_configuration_gives_identical_requests() {
    let seq = sequence(&["StartRecord PrependText=Session001", "StartRecord CreateNewDateDirectory=1"]);

    let mut logs = Vec::new();
    for _ in 0..2 {
        let (transport, log) = ScriptedTransport::new(always_ok);
        let mut session = CommandSession::with_transport(transport, TIMEOUT);
        session
            .run_sequence(&seq, Pacing::new(START_DELAY, STOP_DELAY))
            .await
            .unwrap();
        logs.push(sent(&log));
    }
    assert_eq!(logs[0], logs[1]);
}

#[tokio::test(start_paused = true)]
async fn test_end_to_end_echo_scenario() {
    let (transport, peer) = channel::pair();
    let responder = peer.spawn_responder(|req| Some(format!("ACK:{req}")));
    let mut session = CommandSession::with_transport(transport, TIMEOUT);

    let seq = Sequence::from_starts(
        [cmd("StartRecord Dir=/tmp/out")],
        &cmd("StopRecord"),
        cmd("StopAcquisition"),
    );

    let mut captured = Vec::new();
    let report = session
        .run_sequence_with(&seq, Pacing::new(START_DELAY, STOP_DELAY), |_, reply| {
            captured.push(reply.text().to_string());
        })
        .await
        .unwrap();
    session.close().await;

    assert_eq!(
        captured,
        vec![
            "ACK:StartRecord Dir=/tmp/out",
            "ACK:StopRecord",
            "ACK:StopAcquisition",
        ]
    );
    assert_eq!(
        report.shutdown_reply().map(|r| r.text()),
        Some("ACK:StopAcquisition")
    );
    assert_eq!(report.elapsed, START_DELAY + STOP_DELAY);
    assert_eq!(
        responder.await.unwrap(),
        vec!["StartRecord Dir=/tmp/out", "StopRecord", "StopAcquisition"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_echo_with_helper_fn() {
    let (transport, log) = ScriptedTransport::new(echo);
    let mut session = CommandSession::with_transport(transport, TIMEOUT);
    let reply = session.execute(&cmd("StopRecord")).await.unwrap();
    assert_eq!(reply.text(), "ACK:StopRecord");
    assert_eq!(sent(&log), vec!["StopRecord"]);
}

#[tokio::test(start_paused = true)]
async fn test_abort_unblocks_reply_wait() {
    let (transport, log) = ScriptedTransport::new(never);
    let mut session = CommandSession::with_transport(transport, Duration::from_secs(60));
    let abort = session.abort_handle();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        abort.abort();
    });

    let started = Instant::now();
    let err = session.execute(&cmd("StartRecord")).await.unwrap_err();
    assert!(matches!(err, SessionError::Aborted { .. }));
    assert_eq!(started.elapsed(), Duration::from_millis(100));
    assert!(session.is_closed());
    assert_eq!(sent(&log).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_abort_during_pause_stops_sequence() {
    let (transport, log) = ScriptedTransport::new(always_ok);
    let mut session = CommandSession::with_transport(transport, TIMEOUT);
    let abort = session.abort_handle();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        abort.abort();
    });

    let err = session
        .run_sequence(
            &sequence(&["StartRecord"]),
            Pacing::new(START_DELAY, STOP_DELAY),
        )
        .await
        .unwrap_err();

    assert_eq!(err.step.phase, StepPhase::Start);
    assert!(matches!(err.source, SessionError::Aborted { .. }));
    assert_eq!(sent(&log), vec!["StartRecord"]);
}

#[tokio::test(start_paused = true)]
async fn test_events_record_the_exchange() {
    let (transport, _log) = ScriptedTransport::new(always_ok);
    let mut session = CommandSession::with_transport(transport, TIMEOUT);
    let events = session.events();

    session
        .run_sequence(&sequence(&["StartRecord"]), Pacing::new(START_DELAY, Duration::ZERO))
        .await
        .unwrap();
    session.close().await;

    let history = events.history();
    assert_eq!(
        history.first(),
        Some(&SessionEvent::Connected {
            peer: "scripted".to_string()
        })
    );
    assert!(history.contains(&SessionEvent::Paused { millis: 5000 }));
    assert_eq!(history.last(), Some(&SessionEvent::Closed));
    assert_eq!(
        events.replies(),
        vec![
            ("StartRecord".to_string(), "OK".to_string()),
            ("StopRecord".to_string(), "OK".to_string()),
            ("StopAcquisition".to_string(), "OK".to_string()),
        ]
    );
}
