//! Request-reply transports for controller sessions.
//!
//! Provides:
//! - ZMTP 3.0 wire protocol (greeting, NULL handshake, frames) (feature: zmtp)
//! - `ReqSocket` client and `RepSocket` responder over TCP (feature: zmtp)
//! - In-memory channel transport for tests and dry runs

pub mod channel;

#[cfg(feature = "zmtp")]
pub mod codec;

#[cfg(feature = "zmtp")]
pub mod protocol;

#[cfg(feature = "zmtp")]
pub mod rep;

#[cfg(feature = "zmtp")]
pub mod req;

pub use channel::{ChannelPeer, ChannelTransport};

#[cfg(feature = "zmtp")]
pub use codec::{Frame, FrameCodec};
#[cfg(feature = "zmtp")]
pub use protocol::SocketType;
#[cfg(feature = "zmtp")]
pub use rep::RepSocket;
#[cfg(feature = "zmtp")]
pub use req::ReqSocket;
