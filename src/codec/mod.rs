//! Codec module - payload serialization.
//!
//! - [`MsgPackCodec`] - MessagePack (de)serialization for structured data
//! - [`RequestEnvelope`] / [`ResponseEnvelope`] - the structured payloads
//!   carried inside request and response frames

mod envelope;
mod msgpack;

pub use envelope::{ErrorDescriptor, RequestEnvelope, ResponseEnvelope, WireErrorKind};
pub use msgpack::MsgPackCodec;
