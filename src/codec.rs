//! MessagePack codec for the byte-level entry point.
//!
//! Requests carry the positional arguments as a MessagePack array;
//! responses are encoded with `rmp_serde::to_vec_named` so they arrive as
//! maps (`{"status": ..., "cause": ...}`) rather than positional arrays.

use bytes::Bytes;
use serde_json::Value;

use crate::error::Result;
use crate::handler::CallArgs;
use crate::response::ActionResponse;

/// MessagePack codec for arguments and responses.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (struct-as-map format).
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    /// Decode a positional argument array. An empty payload means no arguments.
    pub fn decode_args(bytes: &[u8]) -> Result<CallArgs> {
        if bytes.is_empty() {
            return Ok(CallArgs::default());
        }
        let values: Vec<Value> = Self::decode(bytes)?;
        Ok(CallArgs::new(values))
    }

    pub fn encode_response(response: &ActionResponse) -> Result<Bytes> {
        Ok(Bytes::from(Self::encode(response)?))
    }
}
