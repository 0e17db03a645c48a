//! JSON envelope shapes carried inside each [`frame`](super::frame) (SPEC_FULL §10.6).
//!
//! ```text
//! request:      [index, method, argument]
//! response:     [index, result]
//! notification: [null,  method, argument]
//! ```
//! A notification is told apart from a response by array length (3 vs 2),
//! and from a request by its `index` being `null`.

use serde_json::{json, Value};

use crate::errors::StoreError;

/// A parsed `[index, method, argument]` request envelope.
pub struct Envelope {
    pub index: i64,
    pub method: String,
    pub argument: Value,
}

/// Parses one frame's JSON payload as a request envelope. Any shape
/// mismatch here is the "malformed request" class spec §7 says to log and
/// drop without a response — distinct from a recognized-but-failing method
/// call, which gets a `{"error": ...}` response instead.
pub fn parse_request(payload: &[u8]) -> Result<Envelope, String> {
    let value: Value = serde_json::from_slice(payload).map_err(|e| e.to_string())?;
    let arr = value.as_array().ok_or("request is not a JSON array")?;
    if arr.len() != 3 {
        return Err(format!("request array has {} elements, want 3", arr.len()));
    }
    let index = arr[0].as_i64().ok_or("request index is not an integer")?;
    let method = arr[1].as_str().ok_or("request method is not a string")?.to_string();
    let argument = arr[2].clone();
    Ok(Envelope { index, method, argument })
}

/// Builds a `[index, result]` response payload.
pub fn build_response(index: i64, result: Value) -> Vec<u8> {
    json!([index, result]).to_string().into_bytes()
}

/// Builds a `{"error": <short-string>}` result for a failed method call
/// (spec §7), wrapped in a response envelope.
pub fn build_error_response(index: i64, err: &StoreError) -> Vec<u8> {
    build_response(index, json!({ "error": err.wire_label() }))
}

/// Builds a `[null, method, argument]` asynchronous notification payload.
pub fn build_notification(method: &str, argument: Value) -> Vec<u8> {
    json!([Value::Null, method, argument]).to_string().into_bytes()
}
