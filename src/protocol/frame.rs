//! Frame struct and stateless frame encoding.
//!
//! A frame is the unit of wire exchange: header, opaque payload, and a
//! trailing CRC-32C checksum over everything that precedes it. Encoding is a
//! pure function; the streaming decoder lives in
//! [`FrameBuffer`](super::FrameBuffer). Uses `bytes::Bytes` for zero-copy
//! payload sharing.

use bytes::Bytes;

use super::wire_format::{FrameKind, Header, CHECKSUM_SIZE, FRAME_OVERHEAD, HEADER_SIZE};

/// A complete, validated protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Payload bytes (zero-copy via `bytes::Bytes`). Opaque to the codec.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from header and payload.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Create a request frame for the given correlation id.
    pub fn request(correlation_id: u64, payload: Bytes) -> Self {
        Self::new(
            Header::new(FrameKind::Request, correlation_id, payload.len() as u32),
            payload,
        )
    }

    /// Create a response frame carrying the originating request's id.
    pub fn response(correlation_id: u64, payload: Bytes) -> Self {
        Self::new(
            Header::new(FrameKind::Response, correlation_id, payload.len() as u32),
            payload,
        )
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the correlation id.
    #[inline]
    pub fn correlation_id(&self) -> u64 {
        self.header.correlation_id
    }

    /// Check if this is a request frame.
    #[inline]
    pub fn is_request(&self) -> bool {
        self.header.is_request()
    }

    /// Check if this is a response frame.
    #[inline]
    pub fn is_response(&self) -> bool {
        self.header.is_response()
    }

    /// Total encoded size of this frame.
    #[inline]
    pub fn encoded_len(&self) -> usize {
        FRAME_OVERHEAD + self.payload.len()
    }
}

/// Encode a complete frame as a single byte vector.
///
/// Serializes the header, appends the payload, computes the CRC-32C over
/// those bytes and appends it. Deterministic and side-effect free; the
/// invariant `checksum == computed(frame without checksum)` holds for every
/// emitted frame.
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    let mut buf = Vec::with_capacity(frame.encoded_len());
    buf.extend_from_slice(&frame.header.encode());
    buf.extend_from_slice(&frame.payload);
    let checksum = crc32c::crc32c(&buf);
    buf.extend_from_slice(&checksum.to_be_bytes());
    buf
}

/// Encode the parts of a frame for scatter/gather I/O.
///
/// Returns the encoded header and checksum separately so the payload can be
/// written without copying (writev-style).
pub fn encode_frame_parts(frame: &Frame) -> ([u8; HEADER_SIZE], [u8; CHECKSUM_SIZE]) {
    let header = frame.header.encode();
    let mut crc = crc32c::crc32c(&header);
    crc = crc32c::crc32c_append(crc, &frame.payload);
    (header, crc.to_be_bytes())
}
