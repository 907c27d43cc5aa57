//! Session and sequence errors.

use std::{fmt, time::Duration};

use record_control_core::TransportError;

/// Session error.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Connection error with {peer}: {source}")]
    Connection {
        peer: String,
        #[source]
        source: TransportError,
    },
    #[error("No reply to \"{command}\" within {timeout:?}")]
    Timeout { command: String, timeout: Duration },
    #[error("Malformed reply to \"{command}\": {reason}")]
    MalformedReply { command: String, reason: String },
    #[error("Aborted {during}")]
    Aborted { during: String },
    #[error("Session is closed")]
    Closed,
}

impl SessionError {
    /// Whether the failure is a reply timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Phase of a sequence step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    Start,
    Stop,
    Shutdown,
}

impl fmt::Display for StepPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Shutdown => "shutdown",
        })
    }
}

/// One position in a command sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceStep {
    /// 1-based pair number; for the shutdown step, one past the last pair.
    pub pair: usize,
    pub phase: StepPhase,
    pub command: String,
}

impl fmt::Display for SequenceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.phase {
            StepPhase::Shutdown => write!(f, "shutdown \"{}\"", self.command),
            phase => write!(f, "pair {} {phase} \"{}\"", self.pair, self.command),
        }
    }
}

/// A sequence aborted at `step`.
#[derive(Debug, thiserror::Error)]
#[error("Sequence failed at {step}: {source}")]
pub struct SequenceError {
    pub step: SequenceStep,
    #[source]
    pub source: SessionError,
}
