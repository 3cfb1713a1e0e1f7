//! Protocol module - wire format, framing, and the streaming decoder.
//!
//! This module implements the binary protocol:
//! - 16-byte header encoding/decoding with a trailing CRC-32C checksum
//! - Stateless frame encoding
//! - Frame buffer for accumulating partial reads

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{encode_frame, encode_frame_parts, Frame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    FrameKind, Header, CHECKSUM_SIZE, DEFAULT_MAX_PAYLOAD_SIZE, FRAME_OVERHEAD, HEADER_SIZE,
    MAGIC, PROTOCOL_VERSION,
};
