//! Dedicated writer task for frame sending.
//!
//! Each connection gets one writer task fed by an mpsc channel. This
//! serializes frame writes (two encoded frames never interleave on the wire)
//! without a mutex, and enables batching multiple frames into single
//! syscalls via `write_vectored`.
//!
//! ```text
//! call()    ─┐
//! handler 1 ─┼─► mpsc::Sender<OutboundFrame> ─► writer task ─► stream
//! handler N ─┘
//! ```

use std::io::IoSlice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{FramewireError, Result};
use crate::protocol::{encode_frame_parts, Frame, CHECKSUM_SIZE, HEADER_SIZE};

/// Default maximum pending frames before backpressure kicks in.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 1024;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default backpressure timeout.
pub const DEFAULT_BACKPRESSURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// A frame ready to be written to the stream.
///
/// The header and checksum are pre-encoded; the payload stays a zero-copy
/// `Bytes` handle so the three parts can be written with scatter/gather I/O.
#[derive(Debug)]
pub struct OutboundFrame {
    /// Pre-encoded header (16 bytes).
    header: [u8; HEADER_SIZE],
    /// Payload bytes (may be empty).
    payload: Bytes,
    /// Pre-computed CRC-32C trailer (4 bytes).
    checksum: [u8; CHECKSUM_SIZE],
}

impl OutboundFrame {
    /// Encode a frame for transmission.
    pub fn encode(frame: &Frame) -> Self {
        let (header, checksum) = encode_frame_parts(frame);
        Self {
            header,
            payload: frame.payload.clone(),
            checksum,
        }
    }

    /// Total size of this frame on the wire.
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len() + CHECKSUM_SIZE
    }

    /// The wire parts of this frame, in order. The payload slice is omitted
    /// when empty.
    fn parts(&self) -> impl Iterator<Item = &[u8]> + '_ {
        let payload = (!self.payload.is_empty()).then_some(&self.payload[..]);
        std::iter::once(&self.header[..])
            .chain(payload)
            .chain(std::iter::once(&self.checksum[..]))
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Maximum pending frames before backpressure kicks in.
    pub max_pending_frames: usize,
    /// Channel capacity for the frame queue.
    pub channel_capacity: usize,
    /// Timeout when waiting for backpressure to clear.
    pub backpressure_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            backpressure_timeout: DEFAULT_BACKPRESSURE_TIMEOUT,
        }
    }
}

/// Handle for sending frames to the writer task.
///
/// Cheaply cloneable; shared by the correlation engine and every concurrent
/// handler on a connection.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
    pending: Arc<AtomicUsize>,
    max_pending: usize,
    timeout: Duration,
}

impl WriterHandle {
    fn new(
        tx: mpsc::Sender<OutboundFrame>,
        pending: Arc<AtomicUsize>,
        max_pending: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            tx,
            pending,
            max_pending,
            timeout,
        }
    }

    /// Send a frame to the writer task.
    ///
    /// Waits if backpressure is active, timing out after the configured
    /// duration.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        let current = self.pending.load(Ordering::Acquire);
        if current >= self.max_pending {
            self.wait_for_backpressure().await?;
        }

        // Increment pending count BEFORE sending
        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.send(frame).await.map_err(|_| {
            self.pending.fetch_sub(1, Ordering::Release);
            FramewireError::ConnectionClosed
        })
    }

    /// Wait for backpressure to clear with timeout.
    async fn wait_for_backpressure(&self) -> Result<()> {
        let start = Instant::now();
        let check_interval = Duration::from_micros(100);

        loop {
            if self.pending.load(Ordering::Acquire) < self.max_pending {
                return Ok(());
            }

            if start.elapsed() > self.timeout {
                return Err(FramewireError::BackpressureTimeout);
            }

            tokio::time::sleep(check_interval).await;
        }
    }

    /// Check if backpressure is currently active.
    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        self.pending.load(Ordering::Acquire) >= self.max_pending
    }

    /// Get current pending frame count.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

/// Spawn the writer task and return a handle for sending frames.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle::new(
        tx,
        pending.clone(),
        config.max_pending_frames,
        config.backpressure_timeout,
    );

    let task = tokio::spawn(writer_loop(rx, writer, pending));

    (handle, task)
}

/// Main writer loop - receives frames and writes them to the stream.
async fn writer_loop<W>(
    mut rx: mpsc::Receiver<OutboundFrame>,
    mut writer: W,
    pending: Arc<AtomicUsize>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        // Wait for first frame
        let first = match rx.recv().await {
            Some(f) => f,
            None => {
                // Channel closed, clean shutdown
                return Ok(());
            }
        };

        // Collect additional ready frames (non-blocking)
        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        let batch_size = batch.len();
        write_batch(&mut writer, &batch).await?;

        pending.fetch_sub(batch_size, Ordering::Release);
    }
}

/// Write a batch of frames using scatter/gather I/O (write_vectored).
///
/// Each frame contributes up to three slices: header, payload, checksum.
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let slices: Vec<IoSlice<'_>> = batch
        .iter()
        .flat_map(|frame| frame.parts())
        .map(IoSlice::new)
        .collect();

    let total_size: usize = batch.iter().map(|f| f.size()).sum();

    // Fast path: one vectored write covers the whole batch.
    let written = writer.write_vectored(&slices).await?;

    if written == total_size {
        writer.flush().await?;
        return Ok(());
    }

    if written == 0 {
        return Err(FramewireError::Io(std::io::Error::new(
            std::io::ErrorKind::WriteZero,
            "write_vectored returned 0",
        )));
    }

    // Slow path: partial write, continue with the remaining data.
    let mut total_written = written;

    while total_written < total_size {
        let remaining_slices = build_remaining_slices(batch, total_written);
        if remaining_slices.is_empty() {
            break;
        }

        let written = writer.write_vectored(&remaining_slices).await?;
        if written == 0 {
            return Err(FramewireError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }

        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for remaining data after a partial write.
fn build_remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 3);
    let mut skipped = 0;

    for part in batch.iter().flat_map(|frame| frame.parts()) {
        let part_start = skipped;
        let part_end = skipped + part.len();

        if skip_bytes < part_end {
            let start_in_part = skip_bytes.saturating_sub(part_start);
            slices.push(IoSlice::new(&part[start_in_part..]));
        }
        skipped = part_end;
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{FrameBuffer, FRAME_OVERHEAD};
    use std::io::Cursor;
    use tokio::io::duplex;

    fn outbound(id: u64, payload: &'static [u8]) -> OutboundFrame {
        OutboundFrame::encode(&Frame::request(id, Bytes::from_static(payload)))
    }

    #[test]
    fn test_outbound_frame_size() {
        let frame = outbound(42, b"hello");
        assert_eq!(frame.size(), FRAME_OVERHEAD + 5);
    }

    #[test]
    fn test_outbound_frame_empty_payload_has_two_parts() {
        let frame = outbound(42, b"");
        assert_eq!(frame.parts().count(), 2);
        assert_eq!(frame.size(), FRAME_OVERHEAD);
    }

    #[test]
    fn test_writer_config_default() {
        let config = WriterConfig::default();
        assert_eq!(config.max_pending_frames, DEFAULT_MAX_PENDING_FRAMES);
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.backpressure_timeout, DEFAULT_BACKPRESSURE_TIMEOUT);
    }

    #[tokio::test]
    async fn test_writer_handle_send_produces_decodable_frame() {
        let (client, mut server) = duplex(4096);
        let (handle, _task) = spawn_writer_task(client, WriterConfig::default());

        handle.send(outbound(42, b"hello")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;

        let mut buf = vec![0u8; 64];
        let n = tokio::io::AsyncReadExt::read(&mut server, &mut buf)
            .await
            .unwrap();
        assert_eq!(n, FRAME_OVERHEAD + 5);

        // The written bytes must decode back to the same frame.
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&buf[..n]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].correlation_id(), 42);
        assert_eq!(frames[0].payload(), b"hello");
    }

    #[tokio::test]
    async fn test_writer_batching() {
        let (client, mut server) = duplex(65536);
        let (handle, _task) = spawn_writer_task(client, WriterConfig::default());

        for i in 0..10u64 {
            handle.send(outbound(i, b"abcd")).await.unwrap();
        }

        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut buf = vec![0u8; 4096];
        let n = tokio::io::AsyncReadExt::read(&mut server, &mut buf)
            .await
            .unwrap();

        let expected_size = 10 * (FRAME_OVERHEAD + 4);
        assert_eq!(n, expected_size);

        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&buf[..n]).unwrap();
        assert_eq!(frames.len(), 10);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.correlation_id(), i as u64);
        }
    }

    #[tokio::test]
    async fn test_write_batch_multiple() {
        let mut buf = Cursor::new(Vec::new());

        let batch: Vec<_> = (0..5u64).map(|i| outbound(i, b"abc")).collect();
        write_batch(&mut buf, &batch).await.unwrap();

        let written = buf.into_inner();
        assert_eq!(written.len(), 5 * (FRAME_OVERHEAD + 3));

        let mut buffer = FrameBuffer::new();
        assert_eq!(buffer.push(&written).unwrap().len(), 5);
    }

    #[test]
    fn test_build_remaining_slices_no_skip() {
        let batch = vec![outbound(42, b"hello")];
        let slices = build_remaining_slices(&batch, 0);
        assert_eq!(slices.len(), 3); // header + payload + checksum
    }

    #[test]
    fn test_build_remaining_slices_partial_header() {
        let batch = vec![outbound(42, b"hello")];
        let slices = build_remaining_slices(&batch, 5);
        assert_eq!(slices.len(), 3);
        assert_eq!(slices[0].len(), HEADER_SIZE - 5);
        assert_eq!(slices[1].len(), 5);
        assert_eq!(slices[2].len(), CHECKSUM_SIZE);
    }

    #[test]
    fn test_build_remaining_slices_skip_into_checksum() {
        let batch = vec![outbound(42, b"hello")];
        let slices = build_remaining_slices(&batch, HEADER_SIZE + 5 + 1);
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].len(), CHECKSUM_SIZE - 1);
    }

    #[tokio::test]
    async fn test_send_times_out_under_backpressure() {
        // A peer that never reads, behind a pipe too small for one frame,
        // stalls the writer task mid-write; the pending count never drops.
        let (client, _server) = duplex(8);
        let config = WriterConfig {
            max_pending_frames: 1,
            channel_capacity: 1,
            backpressure_timeout: Duration::from_millis(50),
        };
        let (handle, _task) = spawn_writer_task(client, config);

        handle.send(outbound(1, b"hello")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(handle.is_backpressure_active());
        assert_eq!(handle.pending_count(), 1);

        let result = handle.send(outbound(2, b"hello")).await;
        assert!(matches!(result, Err(FramewireError::BackpressureTimeout)));
        // The rejected frame was never accounted for.
        assert_eq!(handle.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_writer_shutdown_on_channel_close() {
        let (client, _server) = duplex(4096);
        let (handle, task) = spawn_writer_task(client, WriterConfig::default());

        drop(handle);

        let result = task.await.unwrap();
        assert!(result.is_ok());
    }
}
