//! ZMTP frame codec.
//!
//! After the greeting, every ZMTP 3.0 exchange is a sequence of frames:
//!
//! ```text
//! +-------+---------------------------+---------+
//! | flags | size (1 byte, or 8 BE)    | body    |
//! +-------+---------------------------+---------+
//! ```
//!
//! Flag bits: `0x01` MORE (another frame of the same message follows),
//! `0x02` LONG (size is 8 bytes), `0x04` COMMAND (body is a command, not
//! message data). All other bits are reserved and must be zero.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use record_control_core::TransportError;
use tokio_util::codec::{Decoder, Encoder};

const FLAG_MORE: u8 = 0x01;
const FLAG_LONG: u8 = 0x02;
const FLAG_COMMAND: u8 = 0x04;
const FLAG_RESERVED: u8 = !(FLAG_MORE | FLAG_LONG | FLAG_COMMAND);

/// Largest frame body accepted by default (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// One ZMTP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Another frame of the same message follows.
    pub more: bool,
    /// The body is a command (`READY`, `ERROR`, ...).
    pub command: bool,
    pub body: Bytes,
}

impl Frame {
    /// A message frame.
    #[must_use]
    pub const fn message(body: Bytes, more: bool) -> Self {
        Self {
            more,
            command: false,
            body,
        }
    }

    /// A command frame.
    #[must_use]
    pub const fn command(body: Bytes) -> Self {
        Self {
            more: false,
            command: true,
            body,
        }
    }
}

/// Codec for ZMTP frames.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    /// Create a codec with the default size limit.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }

    /// Create a codec with a custom size limit.
    #[must_use]
    pub const fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, TransportError> {
        if src.len() < 2 {
            return Ok(None);
        }

        let flags = src[0];
        if flags & FLAG_RESERVED != 0 {
            return Err(TransportError::Protocol(format!(
                "reserved frame flag bits set: {flags:#04x}"
            )));
        }
        let command = flags & FLAG_COMMAND != 0;
        let more = flags & FLAG_MORE != 0;
        if command && more {
            return Err(TransportError::Protocol(
                "command frame with MORE flag".to_string(),
            ));
        }

        let (header_len, size) = if flags & FLAG_LONG != 0 {
            if src.len() < 9 {
                return Ok(None);
            }
            let mut size = [0u8; 8];
            size.copy_from_slice(&src[1..9]);
            (9, u64::from_be_bytes(size))
        } else {
            (2, u64::from(src[1]))
        };

        let size = match usize::try_from(size) {
            Ok(size) if size <= self.max_frame_size => size,
            _ => {
                return Err(TransportError::FrameTooLarge {
                    size,
                    max: self.max_frame_size,
                });
            }
        };

        let total = header_len + size;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(header_len);
        let body = src.split_to(size).freeze();
        Ok(Some(Frame {
            more,
            command,
            body,
        }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = TransportError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), TransportError> {
        let size = frame.body.len();
        if size > self.max_frame_size {
            return Err(TransportError::FrameTooLarge {
                size: size as u64,
                max: self.max_frame_size,
            });
        }

        let mut flags = 0;
        if frame.more {
            flags |= FLAG_MORE;
        }
        if frame.command {
            flags |= FLAG_COMMAND;
        }

        if let Ok(short) = u8::try_from(size) {
            dst.reserve(2 + size);
            dst.put_u8(flags);
            dst.put_u8(short);
        } else {
            dst.reserve(9 + size);
            dst.put_u8(flags | FLAG_LONG);
            dst.put_u64(size as u64);
        }
        dst.extend_from_slice(&frame.body);
        Ok(())
    }
}
