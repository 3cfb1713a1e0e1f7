//! Server dispatch engine.
//!
//! Runs the serving side of one connection: reads bytes into the streaming
//! decoder, and for every decoded request frame spawns a handler task that
//! resolves the target service and operation through the
//! [`ServiceRegistry`], executes it, and writes back a response frame.
//!
//! The response always carries the originating request's correlation id,
//! which is the sole linkage between a request and its response and is
//! never altered or regenerated. Requests execute concurrently with no
//! ordering requirement between different ids, bounded by a semaphore.
//!
//! # Example
//!
//! ```ignore
//! use framewire::{RpcServer, ServerConfig, ServiceHandler, ServiceRegistry};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(ServiceRegistry::new().service(
//!     ServiceHandler::new("user").operation("getUserName", |id: u64| async move {
//!         Ok(format!("User{}", id))
//!     }),
//! ));
//! RpcServer::serve(read_half, write_half, registry, ServerConfig::default()).await?;
//! ```

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::Semaphore;

use crate::codec::RequestEnvelope;
use crate::error::{FramewireError, Result};
use crate::handler::ServiceRegistry;
use crate::protocol::{Frame, FrameBuffer, DEFAULT_MAX_PAYLOAD_SIZE};
use crate::writer::{spawn_writer_task, OutboundFrame, WriterConfig, WriterHandle};

/// Default maximum concurrently executing handlers per connection.
pub const DEFAULT_MAX_CONCURRENT_HANDLERS: usize = 256;

/// Configuration for the serving side of a connection.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum accepted payload size for inbound frames.
    pub max_payload_size: u32,
    /// Maximum concurrently executing handlers.
    pub max_concurrent_handlers: usize,
    /// Writer task configuration.
    pub writer: WriterConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            max_concurrent_handlers: DEFAULT_MAX_CONCURRENT_HANDLERS,
            writer: WriterConfig::default(),
        }
    }
}

/// The serving side of a connection.
pub struct RpcServer;

impl RpcServer {
    /// Serve one connection until EOF or a fatal protocol error.
    ///
    /// Returns `Ok(())` on clean EOF. Corruption (checksum mismatch,
    /// oversized length, unknown version or kind) returns an error and tears
    /// the connection down; it is never repaired.
    pub async fn serve<R, W>(
        reader: R,
        writer: W,
        registry: Arc<ServiceRegistry>,
        config: ServerConfig,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (writer_handle, writer_task) = spawn_writer_task(writer, config.writer.clone());
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_handlers));

        let result =
            Self::read_loop(reader, &registry, &writer_handle, &semaphore, &config).await;

        match result {
            Ok(()) => {
                // Clean EOF: let in-flight handlers finish and their
                // responses drain before the writer exits.
                drop(writer_handle);
                match writer_task.await {
                    Ok(outcome) => outcome,
                    Err(_) => Ok(()),
                }
            }
            Err(e) => {
                // Fatal: stop writing immediately.
                writer_task.abort();
                Err(e)
            }
        }
    }

    /// Main read loop - reads frames and dispatches them to handlers.
    async fn read_loop<R>(
        mut reader: R,
        registry: &Arc<ServiceRegistry>,
        writer: &WriterHandle,
        semaphore: &Arc<Semaphore>,
        config: &ServerConfig,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut frame_buffer = FrameBuffer::with_max_payload(config.max_payload_size);
        let mut buf = vec![0u8; 64 * 1024];

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => return Ok(()), // Connection closed
                Ok(n) => n,
                Err(e) => return Err(FramewireError::Io(e)),
            };

            for frame in frame_buffer.push(&buf[..n])? {
                Self::dispatch_frame(frame, registry, writer, semaphore);
            }
        }
    }

    /// Dispatch a single decoded frame to a handler task.
    fn dispatch_frame(
        frame: Frame,
        registry: &Arc<ServiceRegistry>,
        writer: &WriterHandle,
        semaphore: &Arc<Semaphore>,
    ) {
        if !frame.is_request() {
            tracing::warn!(
                "ignoring non-request frame {} on server connection",
                frame.correlation_id()
            );
            return;
        }

        let correlation_id = frame.correlation_id();

        // The frame passed its checksum, so an undecodable envelope means a
        // confused peer rather than wire corruption: drop the request but
        // keep the connection.
        let envelope = match RequestEnvelope::decode(frame.payload()) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!("dropping request {}: bad envelope: {}", correlation_id, e);
                return;
            }
        };

        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                tracing::warn!(
                    "handler capacity reached, dropping request {} for {}.{}",
                    correlation_id,
                    envelope.service,
                    envelope.operation
                );
                return;
            }
        };

        let registry = registry.clone();
        let writer = writer.clone();

        tokio::spawn(async move {
            // Permit is held until this task completes
            let _permit = permit;

            let response = registry.dispatch(envelope).await;

            let payload = match response.encode() {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!("failed to encode response {}: {}", correlation_id, e);
                    return;
                }
            };

            let outbound = OutboundFrame::encode(&Frame::response(correlation_id, payload));
            if let Err(e) = writer.send(outbound).await {
                tracing::error!("failed to send response {}: {}", correlation_id, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode_frame;
    use bytes::Bytes;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.max_payload_size, DEFAULT_MAX_PAYLOAD_SIZE);
        assert_eq!(config.max_concurrent_handlers, DEFAULT_MAX_CONCURRENT_HANDLERS);
    }

    #[tokio::test]
    async fn test_serve_clean_eof() {
        let (near, far) = tokio::io::duplex(4096);
        let (read_half, write_half) = tokio::io::split(far);
        let registry = Arc::new(ServiceRegistry::new());

        let server = tokio::spawn(RpcServer::serve(
            read_half,
            write_half,
            registry,
            ServerConfig::default(),
        ));

        drop(near);
        assert!(server.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_serve_corruption_terminates() {
        use tokio::io::AsyncWriteExt;

        let (mut near, far) = tokio::io::duplex(4096);
        let (read_half, write_half) = tokio::io::split(far);
        let registry = Arc::new(ServiceRegistry::new());

        let server = tokio::spawn(RpcServer::serve(
            read_half,
            write_half,
            registry,
            ServerConfig::default(),
        ));

        // A request frame with its checksum byte flipped.
        let mut bytes = encode_frame(&Frame::request(1, Bytes::from_static(b"payload")));
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        near.write_all(&bytes).await.unwrap();

        let result = server.await.unwrap();
        assert!(matches!(result, Err(FramewireError::Corruption(_))));
    }
}
