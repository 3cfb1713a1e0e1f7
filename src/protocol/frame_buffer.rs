//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management. The decoder is a
//! restorable peek over the accumulated bytes: nothing is consumed until an
//! entire frame (header, payload, checksum) is buffered and its checksum
//! verifies, so splitting the same byte sequence at any delivery boundaries
//! yields the identical sequence of emitted frames.
//!
//! Recovery rules:
//! - Bytes that do not start with the magic sentinel are skipped one byte at
//!   a time (resynchronization). This is a best-effort heuristic and can
//!   desynchronize permanently on adversarial input; it is kept as the
//!   documented behavior.
//! - An oversized declared payload length, an unknown version or kind, or a
//!   checksum mismatch is fatal: the error propagates and the caller must
//!   terminate the connection.

use bytes::{Buf, BytesMut};

use super::frame::Frame;
use super::wire_format::{Header, CHECKSUM_SIZE, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE, MAGIC};
use crate::error::{FramewireError, Result};

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from stream reads.
    buffer: BytesMut,
    /// Maximum allowed payload size.
    max_payload_size: u32,
}

impl FrameBuffer {
    /// Create a new frame buffer with the default 10 MiB payload bound.
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a new frame buffer with a custom max payload size.
    pub fn with_max_payload(max_payload_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            max_payload_size,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// This is the main API for processing incoming data from the stream.
    /// A single push may yield zero frames (still fragmented) or several (one
    /// delivery carried multiple frames); partial data stays buffered for the
    /// next push.
    ///
    /// # Errors
    ///
    /// Returns [`FramewireError::Corruption`] on checksum mismatch, unknown
    /// version or kind, or an oversized declared payload length. The buffer
    /// must not be reused afterwards.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Try to extract a single frame from the front of the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete, verified frame was consumed
    /// - `Ok(None)` if more data is needed (nothing consumed)
    /// - `Err(...)` on fatal corruption
    fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        loop {
            if self.buffer.len() < HEADER_SIZE {
                return Ok(None);
            }

            // Resynchronize: drop exactly one byte on bad magic and retry.
            if self.buffer[0..2] != MAGIC {
                tracing::trace!("bad magic, skipping one byte to resynchronize");
                self.buffer.advance(1);
                continue;
            }

            // Peek the header without consuming; bad version/kind is fatal.
            let header = Header::decode(&self.buffer[..HEADER_SIZE])?
                .expect("buffer has a full header");

            // The length field is untrusted: reject before allocating.
            header.validate(self.max_payload_size)?;

            let payload_len = header.payload_length as usize;
            let total = HEADER_SIZE + payload_len + CHECKSUM_SIZE;
            if self.buffer.len() < total {
                // Restore the peek: consume nothing, wait for more bytes.
                return Ok(None);
            }

            let body_end = HEADER_SIZE + payload_len;
            let computed = crc32c::crc32c(&self.buffer[..body_end]);
            let declared = u32::from_be_bytes(
                self.buffer[body_end..total].try_into().expect("4 bytes"),
            );
            if computed != declared {
                return Err(FramewireError::Corruption(format!(
                    "checksum mismatch for frame {}: computed {:#010x}, declared {:#010x}",
                    header.correlation_id, computed, declared
                )));
            }

            // Consume the full frame and freeze the payload (zero-copy).
            let mut consumed = self.buffer.split_to(total);
            consumed.advance(HEADER_SIZE);
            consumed.truncate(payload_len);

            return Ok(Some(Frame::new(header, consumed.freeze())));
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode_frame;
    use bytes::Bytes;

    fn request_bytes(id: u64, payload: &'static [u8]) -> Vec<u8> {
        encode_frame(&Frame::request(id, Bytes::from_static(payload)))
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&request_bytes(42, b"hello")).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].correlation_id(), 42);
        assert_eq!(frames[0].payload(), b"hello");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut buffer = FrameBuffer::new();

        let mut combined = request_bytes(1, b"first");
        combined.extend(request_bytes(2, b"second"));
        combined.extend(request_bytes(3, b"third"));

        let frames = buffer.push(&combined).unwrap();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].correlation_id(), 1);
        assert_eq!(frames[1].correlation_id(), 2);
        assert_eq!(frames[2].correlation_id(), 3);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_header() {
        let mut buffer = FrameBuffer::new();
        let bytes = request_bytes(42, b"test");

        let frames = buffer.push(&bytes[..5]).unwrap();
        assert!(frames.is_empty());
        assert_eq!(buffer.len(), 5);

        let frames = buffer.push(&bytes[5..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), b"test");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_payload_no_partial_consumption() {
        let mut buffer = FrameBuffer::new();
        let bytes = request_bytes(42, b"this is a longer payload that will be fragmented");

        // Header plus part of the payload: nothing may be consumed yet.
        let partial = HEADER_SIZE + 10;
        let frames = buffer.push(&bytes[..partial]).unwrap();
        assert!(frames.is_empty());
        assert_eq!(buffer.len(), partial);

        let frames = buffer.push(&bytes[partial..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = FrameBuffer::new();
        let bytes = request_bytes(42, b"hi");

        let mut all_frames = Vec::new();
        for byte in &bytes {
            all_frames.extend(buffer.push(&[*byte]).unwrap());
        }

        assert_eq!(all_frames.len(), 1);
        assert_eq!(all_frames[0].payload(), b"hi");
    }

    #[test]
    fn test_any_split_yields_same_frames() {
        let mut reference = FrameBuffer::new();
        let mut bytes = request_bytes(1, b"alpha");
        bytes.extend(request_bytes(2, b"bravo charlie"));
        let expected = reference.push(&bytes).unwrap();
        assert_eq!(expected.len(), 2);

        for split in 1..bytes.len() {
            let mut buffer = FrameBuffer::new();
            let mut frames = buffer.push(&bytes[..split]).unwrap();
            frames.extend(buffer.push(&bytes[split..]).unwrap());
            assert_eq!(frames, expected, "split at {}", split);
        }
    }

    #[test]
    fn test_empty_payload() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&request_bytes(42, b"")).unwrap();

        assert_eq!(frames.len(), 1);
        assert!(frames[0].payload().is_empty());
        assert_eq!(frames[0].header.payload_length, 0);
    }

    #[test]
    fn test_resync_skips_leading_garbage() {
        let mut buffer = FrameBuffer::new();
        let mut bytes = vec![0x00, 0x42, 0x13];
        bytes.extend(request_bytes(7, b"after garbage"));

        let frames = buffer.push(&bytes).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].correlation_id(), 7);
        assert_eq!(frames[0].payload(), b"after garbage");
    }

    #[test]
    fn test_oversized_length_rejected_without_buffering_payload() {
        let mut buffer = FrameBuffer::with_max_payload(10 * 1024 * 1024);

        // Header alone declaring a 50 MiB payload must fail immediately.
        let header = Header::new(crate::protocol::FrameKind::Request, 1, 50 * 1024 * 1024);
        let result = buffer.push(&header.encode());

        assert!(matches!(result, Err(FramewireError::Corruption(_))));
    }

    #[test]
    fn test_checksum_mismatch_is_fatal() {
        let mut bytes = request_bytes(42, b"payload");
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let mut buffer = FrameBuffer::new();
        let result = buffer.push(&bytes);
        assert!(matches!(result, Err(FramewireError::Corruption(_))));
    }

    #[test]
    fn test_any_single_bit_flip_rejected() {
        let bytes = request_bytes(9, b"bits");

        for bit_index in 0..bytes.len() * 8 {
            let mut corrupted = bytes.clone();
            corrupted[bit_index / 8] ^= 1 << (bit_index % 8);

            let mut buffer = FrameBuffer::new();
            match buffer.push(&corrupted) {
                // A flip may be fatal corruption outright...
                Err(FramewireError::Corruption(_)) => {}
                // ...or land in the magic bytes and stall resynchronization,
                // but it must never emit a frame with altered content.
                Ok(frames) => assert!(frames.is_empty(), "bit {} emitted a frame", bit_index),
                Err(other) => panic!("unexpected error: {}", other),
            }
        }
    }

    #[test]
    fn test_large_payload() {
        let payload = vec![0xAB; 1024 * 1024];
        let frame = Frame::request(1, Bytes::from(payload.clone()));
        let bytes = encode_frame(&frame);

        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&bytes).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), &payload[..]);
    }

    #[test]
    fn test_mixed_complete_and_partial() {
        let mut buffer = FrameBuffer::new();

        let frame1 = request_bytes(1, b"first");
        let frame2 = request_bytes(2, b"second");

        let mut data = frame1.clone();
        data.extend_from_slice(&frame2[..5]);

        let frames = buffer.push(&data).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].correlation_id(), 1);

        let frames = buffer.push(&frame2[5..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].correlation_id(), 2);
    }
}
