//! Conversion between typed application data and [`Value`]s.
//!
//! Fixed-shape records go through serde, so the usual attributes apply:
//! `#[serde(rename = "...")]` gives a field an alternate wire name and
//! `#[serde(default)]` lets missing fields fall back to their default.
//! Fields present on the wire but unknown to the target are ignored.
//! A null decodes as the zero value of a typed target: `0`, `false`, `""`,
//! an empty sequence or map, or a record whose fields are all zero.
//!
//! Open-ended data uses [`Value`] or [`Map`](crate::Map) as the target,
//! which accepts any well-formed wire value.

mod de;
mod ser;

use crate::{error::MarshalError, types::Value};
use serde::{de::DeserializeOwned, Serialize};

pub fn to_value<T: ?Sized + Serialize>(value: &T) -> Result<Value, MarshalError> {
    value.serialize(ser::ValueSerializer)
}

pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T, MarshalError> {
    T::deserialize(value)
}

/// Decodes `value` into `out`, leaving `out` untouched on failure.
pub fn decode_into<T: DeserializeOwned>(value: Value, out: &mut T) -> Result<(), MarshalError> {
    *out = from_value(value)?;
    Ok(())
}

pub fn to_bytes(value: &Value) -> Result<Vec<u8>, MarshalError> {
    serde_json::to_vec(value).map_err(|e| MarshalError::Unsupported(e.to_string()))
}

pub fn from_bytes(bytes: &[u8]) -> Result<Value, MarshalError> {
    serde_json::from_slice(bytes).map_err(|e| MarshalError::Malformed(e.to_string()))
}

/// Serde adapter carrying a [`Value`] as embedded wire bytes, for frame
/// formats that are not self-describing.
pub(crate) mod wire {
    use crate::types::Value;
    use serde::{
        de::{self, SeqAccess, Visitor},
        Deserializer, Serializer,
    };
    use std::fmt;

    pub(crate) fn serialize<S: Serializer>(value: &Value, serializer: S) -> Result<S::Ok, S::Error> {
        let bytes = super::to_bytes(value).map_err(<S::Error as serde::ser::Error>::custom)?;
        serializer.serialize_bytes(&bytes)
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Value, D::Error> {
        let bytes = deserializer.deserialize_byte_buf(BytesVisitor)?;
        super::from_bytes(&bytes).map_err(de::Error::custom)
    }

    struct BytesVisitor;

    impl<'de> Visitor<'de> for BytesVisitor {
        type Value = Vec<u8>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("wire bytes")
        }

        fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Vec<u8>, E> {
            Ok(v.to_vec())
        }

        fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Vec<u8>, E> {
            Ok(v)
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<u8>, A::Error> {
            let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(b) = seq.next_element()? {
                bytes.push(b);
            }
            Ok(bytes)
        }
    }
}
