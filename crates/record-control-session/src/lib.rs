//! Command sessions against a remote recording controller.
//!
//! Provides:
//! - `CommandSession` - Execute commands one at a time under a reply timeout
//!   and run paced start/stop sequences
//! - `AbortHandle` - Stop a running session from another task
//! - `plan` - `RecordControl` commands and the default recording plan

pub mod abort;
pub mod error;
pub mod plan;
pub mod session;

pub use abort::AbortHandle;
pub use error::{SequenceError, SequenceStep, SessionError, StepPhase};
pub use session::{CommandSession, SequenceReport, StepReply};
