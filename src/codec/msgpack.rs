//! MessagePack codec using `rmp-serde`.
//!
//! Uses `to_vec_named` so structs serialize as maps with field names rather
//! than positional arrays; peers written in other languages expect the map
//! format, and it keeps encodings stable across field reordering.

use crate::error::Result;

/// MessagePack codec for structured data.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MessagePack bytes.
    ///
    /// Deterministic: the same logical value always encodes to the same
    /// bytes.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MessagePack bytes to a value.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
