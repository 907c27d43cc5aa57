//! Numbered session event log with live subscribers.
//!
//! Every event gets a sequence number when it is pushed. Subscribers take
//! the retained history and a live receiver under the same lock, so the
//! two halves neither overlap nor leave a gap.

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
};

use futures::{
    StreamExt, future,
    stream::{self, BoxStream},
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::SessionEvent;

/// Events retained per session before the oldest are dropped.
pub const HISTORY_LIMIT: usize = 4096;

const LIVE_CAPACITY: usize = 256;

/// An event and its position in the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: u64,
    #[serde(flatten)]
    pub event: SessionEvent,
}

struct Log {
    records: VecDeque<EventRecord>,
    next_seq: u64,
}

pub struct EventStore {
    log: Mutex<Log>,
    live: broadcast::Sender<EventRecord>,
    limit: usize,
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(HISTORY_LIMIT)
    }

    /// Store that retains at most `limit` events (at least one).
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        let (live, _) = broadcast::channel(LIVE_CAPACITY);
        Self {
            log: Mutex::new(Log {
                records: VecDeque::new(),
                next_seq: 0,
            }),
            live,
            limit: limit.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Log> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record an event and fan it out. Returns its sequence number.
    pub fn push(&self, event: SessionEvent) -> u64 {
        let mut log = self.lock();
        let seq = log.next_seq;
        log.next_seq += 1;
        let record = EventRecord { seq, event };
        if log.records.len() == self.limit {
            log.records.pop_front();
        }
        log.records.push_back(record.clone());
        // Sent while holding the lock; `subscribe` relies on it.
        let _ = self.live.send(record);
        seq
    }

    /// Retained records, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<EventRecord> {
        self.lock().records.iter().cloned().collect()
    }

    /// Retained events, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<SessionEvent> {
        self.lock().records.iter().map(|r| r.event.clone()).collect()
    }

    /// `(command, reply)` pairs received so far, in order.
    #[must_use]
    pub fn replies(&self) -> Vec<(String, String)> {
        self.lock()
            .records
            .iter()
            .filter_map(|r| reply_of(&r.event))
            .collect()
    }

    /// Snapshot of the history plus a receiver for everything after it.
    #[must_use]
    pub fn subscribe(&self) -> (Vec<EventRecord>, broadcast::Receiver<EventRecord>) {
        let log = self.lock();
        (log.records.iter().cloned().collect(), self.live.subscribe())
    }

    /// Replies received so far, then live replies until the session closes.
    ///
    /// A subscriber that falls more than the live buffer behind skips the
    /// replies it missed.
    #[must_use]
    pub fn reply_stream(&self) -> BoxStream<'static, (String, String)> {
        let (history, rx) = self.subscribe();
        let live = BroadcastStream::new(rx).filter_map(|r| future::ready(r.ok()));
        stream::iter(history)
            .chain(live)
            .take_while(|r| future::ready(!r.event.is_terminal()))
            .filter_map(|r| future::ready(reply_of(&r.event)))
            .boxed()
    }
}

fn reply_of(event: &SessionEvent) -> Option<(String, String)> {
    match event {
        SessionEvent::ReplyReceived { command, reply } => Some((command.clone(), reply.clone())),
        _ => None,
    }
}
