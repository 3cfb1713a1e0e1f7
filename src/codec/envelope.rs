//! Payload envelopes for request and response frames.
//!
//! The frame codec treats payloads as opaque byte strings; this layer gives
//! them structure. A request payload embeds the target service, the
//! operation name, and serialized arguments; a response payload embeds
//! either result bytes or an error descriptor. Both are MessagePack-encoded
//! through [`MsgPackCodec`].

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::msgpack::MsgPackCodec;
use crate::error::{FramewireError, Result};

/// Payload of a request frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestEnvelope {
    /// Target service identifier.
    pub service: String,
    /// Operation to invoke on the service.
    pub operation: String,
    /// Serialized arguments, opaque at this layer.
    pub args: Bytes,
}

impl RequestEnvelope {
    /// Create a new request envelope.
    pub fn new(service: impl Into<String>, operation: impl Into<String>, args: Bytes) -> Self {
        Self {
            service: service.into(),
            operation: operation.into(),
            args,
        }
    }

    /// Encode to MessagePack bytes.
    pub fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(MsgPackCodec::encode(self)?))
    }

    /// Decode from MessagePack bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        MsgPackCodec::decode(bytes)
    }
}

/// Category of a remote failure carried in a response envelope.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WireErrorKind {
    /// No service registered under the requested name.
    ServiceNotFound,
    /// The service exists but has no such operation.
    OperationNotFound,
    /// The handler executed and failed.
    Handler,
}

/// Structured error carried in an error response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorDescriptor {
    /// Error category.
    pub kind: WireErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl ErrorDescriptor {
    /// Create a new error descriptor.
    pub fn new(kind: WireErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Convert into the caller-facing error, recovering the original
    /// service/operation split where the descriptor carries one.
    pub fn into_error(self) -> FramewireError {
        match self.kind {
            WireErrorKind::ServiceNotFound => FramewireError::ServiceNotFound(self.message),
            WireErrorKind::OperationNotFound => match self.message.split_once('.') {
                Some((service, operation)) => FramewireError::OperationNotFound {
                    service: service.to_string(),
                    operation: operation.to_string(),
                },
                None => FramewireError::OperationNotFound {
                    service: String::new(),
                    operation: self.message,
                },
            },
            WireErrorKind::Handler => FramewireError::Handler(self.message),
        }
    }
}

/// Payload of a response frame: result bytes or an error descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ResponseEnvelope {
    /// Successful result, opaque at this layer.
    Ok(Bytes),
    /// Structured failure.
    Err(ErrorDescriptor),
}

impl ResponseEnvelope {
    /// Encode to MessagePack bytes.
    pub fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(MsgPackCodec::encode(self)?))
    }

    /// Decode from MessagePack bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        MsgPackCodec::decode(bytes)
    }

    /// Convert into the caller-facing outcome.
    pub fn into_result(self) -> Result<Bytes> {
        match self {
            ResponseEnvelope::Ok(bytes) => Ok(bytes),
            ResponseEnvelope::Err(descriptor) => Err(descriptor.into_error()),
        }
    }
}
