//! JSON normalization for decoded event arguments
//!
//! Integers become decimal strings, byte sequences and addresses become
//! lowercase `0x` hex, sequences are normalized element by element.

use alloy::primitives::{Address, Bytes, FixedBytes, U256};
use serde_json::Value;

/// Canonical JSON form of a decoded ABI value
pub trait ToPayload {
    fn to_payload(&self) -> Value;
}

impl ToPayload for U256 {
    fn to_payload(&self) -> Value {
        Value::String(self.to_string())
    }
}

macro_rules! small_uint_payload {
    ($($t:ty),*) => {
        $(impl ToPayload for $t {
            fn to_payload(&self) -> Value {
                Value::String(self.to_string())
            }
        })*
    };
}

small_uint_payload!(u8, u16, u32, u64, u128);

impl<const N: usize> ToPayload for FixedBytes<N> {
    fn to_payload(&self) -> Value {
        Value::String(format!("0x{}", hex::encode(self.as_slice())))
    }
}

impl ToPayload for Address {
    fn to_payload(&self) -> Value {
        Value::String(format!("0x{}", hex::encode(self.as_slice())))
    }
}

impl ToPayload for Bytes {
    fn to_payload(&self) -> Value {
        Value::String(format!("0x{}", hex::encode(self.as_ref())))
    }
}

impl ToPayload for bool {
    fn to_payload(&self) -> Value {
        Value::Bool(*self)
    }
}

impl ToPayload for String {
    fn to_payload(&self) -> Value {
        Value::String(self.clone())
    }
}

impl<T: ToPayload> ToPayload for Vec<T> {
    fn to_payload(&self) -> Value {
        Value::Array(self.iter().map(ToPayload::to_payload).collect())
    }
}

impl<T: ToPayload> ToPayload for Option<T> {
    fn to_payload(&self) -> Value {
        self.as_ref().map(ToPayload::to_payload).unwrap_or(Value::Null)
    }
}

/// Normalized string form used for correlation hashes
pub fn as_key<T: ToPayload>(value: &T) -> String {
    match value.to_payload() {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Build a JSON object from `"key" => value` pairs, normalizing each value
macro_rules! fields {
    ($($key:literal => $value:expr),* $(,)?) => {{
        let mut map = serde_json::Map::new();
        $(
            map.insert(
                $key.to_string(),
                $crate::decoder::payload::ToPayload::to_payload(&$value),
            );
        )*
        serde_json::Value::Object(map)
    }};
}

pub(crate) use fields;
