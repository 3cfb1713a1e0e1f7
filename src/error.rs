//! Error types for framewire.

use thiserror::Error;

/// Main error type for all framewire operations.
#[derive(Debug, Error)]
pub enum FramewireError {
    /// I/O error on the underlying byte stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Fatal wire corruption: checksum mismatch, unknown version or frame
    /// kind, or an oversized declared payload length. The connection must be
    /// torn down; corruption is never silently repaired.
    #[error("protocol corruption: {0}")]
    Corruption(String),

    /// MessagePack serialization error.
    #[error("encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack deserialization error.
    #[error("decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// No service registered under the requested name.
    #[error("service not found: {0}")]
    ServiceNotFound(String),

    /// The service exists but has no such operation.
    #[error("operation not found: {service}.{operation}")]
    OperationNotFound { service: String, operation: String },

    /// The remote handler executed and failed.
    #[error("handler error: {0}")]
    Handler(String),

    /// No response arrived before the caller's deadline.
    #[error("call timed out")]
    CallTimeout,

    /// The connection closed while calls were still outstanding.
    #[error("connection closed")]
    ConnectionClosed,

    /// Write queue stayed full past the configured backpressure timeout.
    #[error("backpressure timeout")]
    BackpressureTimeout,
}

/// Result type alias using FramewireError.
pub type Result<T> = std::result::Result<T, FramewireError>;
