//! Wire format encoding and decoding.
//!
//! Implements the 16-byte header format:
//! ```text
//! ┌───────┬─────────┬──────┬────────────────┬──────────┐
//! │ Magic │ Version │ Kind │ Correlation ID │ Length   │
//! │ 2B    │ 1 byte  │ 1B   │ 8 bytes        │ 4 bytes  │
//! │       │         │      │ uint64 BE      │ uint32 BE│
//! └───────┴─────────┴──────┴────────────────┴──────────┘
//! ```
//!
//! Every frame carries a trailing CRC-32C checksum (4 bytes) computed over
//! the header and payload. All multi-byte integers are Big Endian.

use crate::error::{FramewireError, Result};

/// Header size in bytes (fixed, exactly 16).
pub const HEADER_SIZE: usize = 16;

/// Trailing checksum size in bytes.
pub const CHECKSUM_SIZE: usize = 4;

/// Fixed per-frame overhead: header plus checksum.
pub const FRAME_OVERHEAD: usize = HEADER_SIZE + CHECKSUM_SIZE;

/// Two-byte sentinel at the start of every frame.
pub const MAGIC: [u8; 2] = [0xF7, 0x1E];

/// Protocol version. Frames with any other version are corruption; there is
/// no backward-compat negotiation.
pub const PROTOCOL_VERSION: u8 = 1;

/// Default maximum payload size (10 MiB).
///
/// The declared length is untrusted until checked against this bound, so the
/// decoder rejects oversized lengths before allocating anything.
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 10 * 1024 * 1024;

/// Frame kind discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// A call from the client to the server.
    Request = 1,
    /// The server's answer, carrying the originating request's id.
    Response = 2,
}

impl FrameKind {
    /// Parse a wire byte into a frame kind.
    ///
    /// Returns `None` for unrecognized values; the decoder treats those as
    /// corruption.
    pub fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(FrameKind::Request),
            2 => Some(FrameKind::Response),
            _ => None,
        }
    }
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Frame kind (request or response).
    pub kind: FrameKind,
    /// Correlation id linking a response to its request. Unique within one
    /// connection, allocated monotonically starting at 1.
    pub correlation_id: u64,
    /// Payload length in bytes.
    pub payload_length: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(kind: FrameKind, correlation_id: u64, payload_length: u32) -> Self {
        Self {
            kind,
            correlation_id,
            payload_length,
        }
    }

    /// Encode header to bytes (Big Endian), magic and version included.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (16 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0..2].copy_from_slice(&MAGIC);
        buf[2] = PROTOCOL_VERSION;
        buf[3] = self.kind as u8;
        buf[4..12].copy_from_slice(&self.correlation_id.to_be_bytes());
        buf[12..16].copy_from_slice(&self.payload_length.to_be_bytes());
    }

    /// Decode a header from bytes that are already known to start with a
    /// valid magic sequence.
    ///
    /// Returns `Ok(None)` if the buffer is too short. Bad version or kind is
    /// corruption: the caller must terminate the connection.
    pub fn decode(buf: &[u8]) -> Result<Option<Self>> {
        if buf.len() < HEADER_SIZE {
            return Ok(None);
        }
        debug_assert_eq!(&buf[0..2], &MAGIC);

        if buf[2] != PROTOCOL_VERSION {
            return Err(FramewireError::Corruption(format!(
                "unsupported protocol version {}",
                buf[2]
            )));
        }
        let kind = FrameKind::from_wire(buf[3]).ok_or_else(|| {
            FramewireError::Corruption(format!("unknown frame kind {}", buf[3]))
        })?;

        Ok(Some(Self {
            kind,
            correlation_id: u64::from_be_bytes(buf[4..12].try_into().expect("8 bytes")),
            payload_length: u32::from_be_bytes(buf[12..16].try_into().expect("4 bytes")),
        }))
    }

    /// Validate the declared payload length against the configured bound.
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if self.payload_length > max_payload_size {
            return Err(FramewireError::Corruption(format!(
                "payload size {} exceeds maximum {}",
                self.payload_length, max_payload_size
            )));
        }
        Ok(())
    }

    /// Check if this is a request frame.
    #[inline]
    pub fn is_request(&self) -> bool {
        self.kind == FrameKind::Request
    }

    /// Check if this is a response frame.
    #[inline]
    pub fn is_response(&self) -> bool {
        self.kind == FrameKind::Response
    }
}
