//! Core types for command/acknowledgment sessions with a remote recording
//! controller.
//!
//! This crate provides the fundamental building blocks:
//! - `Command` / `CommandBuilder` - Textual commands with `Key=Value` parameters
//! - `Reply` - Decoded acknowledgment from the controller
//! - `Endpoint` / `Pacing` - Connection and timing configuration
//! - `Sequence` - Ordered start/stop pairs plus a final shutdown command
//! - `EventStore` - Numbered event history with live subscribers
//! - `Transport` trait for request-reply transports

pub mod command;
pub mod endpoint;
pub mod event;
pub mod event_store;
pub mod reply;
pub mod sequence;
pub mod traits;

pub use command::{Command, CommandBuilder, CommandError};
pub use endpoint::{Endpoint, Pacing};
pub use event::SessionEvent;
pub use event_store::{EventRecord, EventStore};
pub use reply::Reply;
pub use sequence::{CommandPair, Sequence};
pub use traits::{SessionId, Transport, TransportError};
