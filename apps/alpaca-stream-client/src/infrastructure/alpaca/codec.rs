//! Stream Codec Module
//!
//! Turns WebSocket frames into JSON values and outbound messages into frames.
//!
//! - **JSON** (default): text frames; binary frames holding UTF-8 JSON are
//!   accepted too, since the trade updates endpoint sends those.
//! - **`MessagePack`**: binary frames, opted into per connection. Decoded
//!   values are converted to JSON values so the same typed records
//!   deserialize from either encoding. Timestamp extensions (type -1) become
//!   RFC-3339 strings.
//!
//! Alpaca batches messages into arrays; a bare object is treated as a batch
//! of one.

use chrono::{DateTime, SecondsFormat};
use serde_json::{Map, Number, Value};

use super::messages::OutboundMessage;
use crate::application::ports::Frame;

/// `MessagePack` extension type for timestamps.
const TIMESTAMP_EXT: i8 = -1;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// `MessagePack` encoding failed.
    #[error("`MessagePack` encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// `MessagePack` decoding failed.
    #[error("`MessagePack` decode error: {0}")]
    MsgPackDecode(#[from] rmpv::decode::Error),

    /// Binary frame that should hold JSON is not UTF-8.
    #[error("frame is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Invalid message format.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// Wire encoding of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// JSON text frames.
    #[default]
    Json,
    /// `MessagePack` binary frames.
    MsgPack,
}

/// Frame codec for one connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct Codec {
    encoding: Encoding,
}

impl Codec {
    /// Create a codec for the given encoding.
    #[must_use]
    pub const fn new(encoding: Encoding) -> Self {
        Self { encoding }
    }

    /// Get the encoding.
    #[must_use]
    pub const fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Encode an outbound message.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self, message: &OutboundMessage) -> Result<Frame, CodecError> {
        match self.encoding {
            Encoding::Json => Ok(Frame::Text(serde_json::to_string(message)?)),
            Encoding::MsgPack => Ok(Frame::Binary(rmp_serde::to_vec_named(message)?)),
        }
    }

    /// Decode a frame into its batch of messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be parsed or is neither an array
    /// nor an object.
    pub fn decode(&self, frame: &Frame) -> Result<Vec<Value>, CodecError> {
        let value = match (frame, self.encoding) {
            (Frame::Text(text), _) => serde_json::from_str(text)?,
            (Frame::Binary(bytes), Encoding::Json) => {
                serde_json::from_str(&String::from_utf8(bytes.clone())?)?
            }
            (Frame::Binary(bytes), Encoding::MsgPack) => {
                let mut reader = bytes.as_slice();
                msgpack_to_json(rmpv::decode::read_value(&mut reader)?)
            }
        };

        match value {
            Value::Array(messages) => Ok(messages),
            Value::Object(_) => Ok(vec![value]),
            other => Err(CodecError::InvalidFormat(format!(
                "expected array or object, got {other}"
            ))),
        }
    }
}

/// Convert a decoded `MessagePack` value into a JSON value.
fn msgpack_to_json(value: rmpv::Value) -> Value {
    match value {
        rmpv::Value::Nil => Value::Null,
        rmpv::Value::Boolean(b) => Value::Bool(b),
        rmpv::Value::Integer(i) => i
            .as_i64()
            .map(Number::from)
            .or_else(|| i.as_u64().map(Number::from))
            .map_or(Value::Null, Value::Number),
        rmpv::Value::F32(f) => float(f64::from(f)),
        rmpv::Value::F64(f) => float(f),
        rmpv::Value::String(s) => match s.into_str() {
            Some(s) => Value::String(s),
            None => Value::Null,
        },
        rmpv::Value::Binary(bytes) => {
            Value::Array(bytes.into_iter().map(|b| Value::Number(b.into())).collect())
        }
        rmpv::Value::Array(items) => Value::Array(items.into_iter().map(msgpack_to_json).collect()),
        rmpv::Value::Map(entries) => {
            let mut map = Map::with_capacity(entries.len());
            for (key, value) in entries {
                let key = match key {
                    rmpv::Value::String(s) => s.into_str().unwrap_or_default(),
                    other => other.to_string(),
                };
                map.insert(key, msgpack_to_json(value));
            }
            Value::Object(map)
        }
        rmpv::Value::Ext(TIMESTAMP_EXT, data) => {
            decode_timestamp(&data).map_or(Value::Null, Value::String)
        }
        rmpv::Value::Ext(_, _) => Value::Null,
    }
}

fn float(f: f64) -> Value {
    Number::from_f64(f).map_or(Value::Null, Value::Number)
}

/// Decode the 32, 64 and 96 bit `MessagePack` timestamp layouts.
fn decode_timestamp(data: &[u8]) -> Option<String> {
    let (secs, nanos) = match data.len() {
        4 => (i64::from(u32::from_be_bytes(data.try_into().ok()?)), 0),
        8 => {
            let raw = u64::from_be_bytes(data.try_into().ok()?);
            let nanos = u32::try_from(raw >> 34).ok()?;
            let secs = i64::try_from(raw & 0x0000_0003_ffff_ffff).ok()?;
            (secs, nanos)
        }
        12 => {
            let nanos = u32::from_be_bytes(data[..4].try_into().ok()?);
            let secs = i64::from_be_bytes(data[4..].try_into().ok()?);
            (secs, nanos)
        }
        _ => return None,
    };
    DateTime::from_timestamp(secs, nanos).map(|ts| ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}
