//! Client correlation engine.
//!
//! Issues correlation ids, registers pending calls before transmission, and
//! routes decoded response frames back to their waiting callers. Responses
//! may arrive in any order relative to the order requests were sent; each is
//! matched purely by correlation id.
//!
//! Lifecycle per call: allocate id → register in the [`PendingCalls`] table
//! → encode and send the request frame → suspend on the completion slot.
//! Exactly one of {response, timeout, connection-closed} resolves it.
//!
//! # Example
//!
//! ```ignore
//! use framewire::{ClientBuilder, MsgPackCodec};
//! use std::time::Duration;
//!
//! let client = ClientBuilder::new().start(read_half, write_half);
//! let name: String = client
//!     .call_typed("user", "getUserName", &1u64, Duration::from_secs(5))
//!     .await?;
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::codec::{MsgPackCodec, RequestEnvelope, ResponseEnvelope};
use crate::error::{FramewireError, Result};
use crate::pending::PendingCalls;
use crate::protocol::{Frame, FrameBuffer, DEFAULT_MAX_PAYLOAD_SIZE};
use crate::writer::{spawn_writer_task, OutboundFrame, WriterConfig, WriterHandle};

/// Default interval between timeout sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(100);

/// Configuration for the client side of a connection.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Maximum accepted payload size for inbound frames.
    pub max_payload_size: u32,
    /// Interval between timeout sweeps over the pending-call table.
    pub sweep_interval: Duration,
    /// Writer task configuration.
    pub writer: WriterConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            writer: WriterConfig::default(),
        }
    }
}

/// Builder for configuring and starting an [`RpcClient`].
#[derive(Default)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum accepted inbound payload size.
    pub fn max_payload_size(mut self, bytes: u32) -> Self {
        self.config.max_payload_size = bytes;
        self
    }

    /// Set the timeout sweep interval.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    /// Set the writer task configuration.
    pub fn writer_config(mut self, writer: WriterConfig) -> Self {
        self.config.writer = writer;
        self
    }

    /// Start the client over the given stream halves.
    pub fn start<R, W>(self, reader: R, writer: W) -> RpcClient
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        RpcClient::start_with_config(reader, writer, self.config)
    }
}

/// The calling side of a connection.
///
/// The underlying transport is supplied by the caller as stream halves; the
/// client only assumes ordered, reliable byte delivery.
pub struct RpcClient {
    pending: Arc<PendingCalls>,
    writer: WriterHandle,
    next_id: AtomicU64,
    shutdown_rx: oneshot::Receiver<()>,
    read_task: JoinHandle<()>,
    sweep_task: JoinHandle<()>,
    _writer_task: JoinHandle<Result<()>>,
}

impl RpcClient {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Start a client with default configuration.
    pub fn start<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::start_with_config(reader, writer, ClientConfig::default())
    }

    /// Start a client with the given configuration.
    ///
    /// Spawns the writer task, the response read loop, and the timeout
    /// sweep.
    pub fn start_with_config<R, W>(reader: R, writer: W, config: ClientConfig) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (writer_handle, writer_task) = spawn_writer_task(writer, config.writer.clone());
        let pending = Arc::new(PendingCalls::new());

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let read_pending = pending.clone();
        let max_payload = config.max_payload_size;
        let read_task = tokio::spawn(async move {
            if let Err(e) = Self::read_loop(reader, &read_pending, max_payload).await {
                tracing::error!("client read loop error: {}", e);
            }
            // Connection is gone, one way or another: fail every call still
            // in flight.
            let failed = read_pending.fail_all_closed();
            if failed > 0 {
                tracing::debug!("failed {} pending calls on connection close", failed);
            }
            let _ = shutdown_tx.send(());
        });

        let sweep_pending = pending.clone();
        let sweep_interval = config.sweep_interval;
        let sweep_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            loop {
                ticker.tick().await;
                let expired = sweep_pending.expire_due(Instant::now());
                if expired > 0 {
                    tracing::debug!("expired {} timed-out calls", expired);
                }
            }
        });

        Self {
            pending,
            writer: writer_handle,
            next_id: AtomicU64::new(1),
            shutdown_rx,
            read_task,
            sweep_task,
            _writer_task: writer_task,
        }
    }

    /// Response read loop: decode frames and route them by correlation id.
    ///
    /// Returns `Ok(())` on clean EOF; any decode corruption or I/O failure
    /// propagates and tears the connection down.
    async fn read_loop<R>(mut reader: R, pending: &PendingCalls, max_payload: u32) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut frame_buffer = FrameBuffer::with_max_payload(max_payload);
        let mut buf = vec![0u8; 64 * 1024];

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => return Ok(()), // Connection closed
                Ok(n) => n,
                Err(e) => return Err(FramewireError::Io(e)),
            };

            for frame in frame_buffer.push(&buf[..n])? {
                Self::route_response(frame, pending);
            }
        }
    }

    /// Resolve one decoded frame against the pending-call table.
    fn route_response(frame: Frame, pending: &PendingCalls) {
        if !frame.is_response() {
            tracing::warn!(
                "ignoring non-response frame {} on client connection",
                frame.correlation_id()
            );
            return;
        }

        let id = frame.correlation_id();
        let outcome = match ResponseEnvelope::decode(frame.payload()) {
            Ok(envelope) => envelope.into_result(),
            Err(e) => Err(e),
        };

        if !pending.complete(id, outcome) {
            // Expected race: the call already timed out or was resolved.
            tracing::debug!("discarding response for unknown call {}", id);
        }
    }

    /// Invoke `operation` on the remote `service` with raw argument bytes.
    ///
    /// Suspends until the call resolves; the outcome is exactly one of
    /// result bytes, a structured remote error,
    /// [`FramewireError::CallTimeout`], or
    /// [`FramewireError::ConnectionClosed`].
    pub async fn call(
        &self,
        service: &str,
        operation: &str,
        args: Bytes,
        timeout: Duration,
    ) -> Result<Bytes> {
        let payload = RequestEnvelope::new(service, operation, args).encode()?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + timeout;

        // Register before transmitting so a fast response can never arrive
        // for an unregistered id.
        let rx = self.pending.register(id, deadline);

        let frame = OutboundFrame::encode(&Frame::request(id, payload));
        if let Err(e) = self.writer.send(frame).await {
            self.pending.complete(id, Err(FramewireError::ConnectionClosed));
            return Err(e);
        }

        match rx.await {
            Ok(outcome) => outcome,
            // Sender dropped without resolving; only possible if the table
            // was torn down underneath us.
            Err(_) => Err(FramewireError::ConnectionClosed),
        }
    }

    /// Invoke a remote operation with typed arguments and result.
    ///
    /// Arguments and result travel as MessagePack inside the opaque payload.
    pub async fn call_typed<T, U>(
        &self,
        service: &str,
        operation: &str,
        args: &T,
        timeout: Duration,
    ) -> Result<U>
    where
        T: Serialize,
        U: DeserializeOwned,
    {
        let args = Bytes::from(MsgPackCodec::encode(args)?);
        let result = self.call(service, operation, args, timeout).await?;
        MsgPackCodec::decode(&result)
    }

    /// Number of calls currently awaiting a response.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Wait until the connection closes.
    ///
    /// Consumes the client and resolves once the read loop has ended and all
    /// pending calls have been failed.
    pub async fn wait_for_shutdown(mut self) -> Result<()> {
        let _ = (&mut self.shutdown_rx).await;
        Ok(())
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.read_task.abort();
        self.sweep_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_configuration() {
        let builder = RpcClient::builder()
            .max_payload_size(1024)
            .sweep_interval(Duration::from_millis(10));

        assert_eq!(builder.config.max_payload_size, 1024);
        assert_eq!(builder.config.sweep_interval, Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_ids_are_monotonic_from_one() {
        let (_near, far) = tokio::io::duplex(4096);
        let (read_half, write_half) = tokio::io::split(far);
        let client = RpcClient::start(read_half, write_half);

        assert_eq!(client.next_id.fetch_add(1, Ordering::Relaxed), 1);
        assert_eq!(client.next_id.fetch_add(1, Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_call_fails_closed_when_peer_drops() {
        let (near, far) = tokio::io::duplex(4096);
        let (read_half, write_half) = tokio::io::split(far);
        let client = Arc::new(RpcClient::start(read_half, write_half));

        let caller = client.clone();
        let call = tokio::spawn(async move {
            caller
                .call("user", "getUserName", Bytes::new(), Duration::from_secs(5))
                .await
        });

        // Let the call register and transmit, then drop the peer.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(client.in_flight(), 1);
        drop(near);

        let result = call.await.unwrap();
        assert!(matches!(result, Err(FramewireError::ConnectionClosed)));
        assert_eq!(client.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_wait_for_shutdown_resolves_when_peer_drops() {
        let (near, far) = tokio::io::duplex(4096);
        let (read_half, write_half) = tokio::io::split(far);
        let client = RpcClient::start(read_half, write_half);

        drop(near);
        client.wait_for_shutdown().await.unwrap();
    }
}
