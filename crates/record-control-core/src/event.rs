//! Typed session events.

use serde::{Deserialize, Serialize};

/// Something observable that happened on a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Connection to the peer is established.
    Connected { peer: String },
    /// A command was sent and its reply is now outstanding.
    CommandSent { command: String },
    /// The reply to a command arrived.
    ReplyReceived { command: String, reply: String },
    /// Execution paused between commands.
    Paused { millis: u64 },
    /// The session failed and will not send again.
    Failed { message: String },
    /// The connection was released.
    Closed,
}

impl SessionEvent {
    /// Whether this event ends the session.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}
