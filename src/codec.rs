//! JSON payload codec
//!
//! Everything on the wire is UTF-8 JSON. Outbound publish and query payloads
//! must be objects.

use bytes::Bytes;
use serde_json::{json, Map, Value};

use crate::types::{FabricError, Result};

/// Encode an outbound payload, rejecting anything but a JSON object
pub fn encode_object(payload: &Value) -> Result<Bytes> {
    if !payload.is_object() {
        return Err(FabricError::Validation(format!(
            "payload must be a JSON object, got {}",
            type_name(payload)
        )));
    }
    encode(payload)
}

/// Encode any JSON value
pub fn encode(value: &Value) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| FabricError::Validation(format!("payload is not serializable: {e}")))
}

pub fn decode(payload: &[u8]) -> std::result::Result<Value, serde_json::Error> {
    serde_json::from_slice(payload)
}

/// Shape a handler result into the reply body.
///
/// Nothing or an empty object becomes `{"result":"SUCCESS"}`, a non-object
/// value is wrapped as `{"result": value}`, a non-empty object is sent as is.
pub fn normalize_response(response: Option<Value>) -> Value {
    match response {
        None => success(),
        Some(Value::Object(map)) if map.is_empty() => success(),
        Some(object @ Value::Object(_)) => object,
        Some(other) => {
            let mut map = Map::new();
            map.insert("result".to_string(), other);
            Value::Object(map)
        }
    }
}

fn success() -> Value {
    json!({ "result": "SUCCESS" })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
