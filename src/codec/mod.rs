//! Codec for user records crossing the remote-store boundary.
//!
//! Every date in the record tree is routed through [`wire_time`] by the serde
//! attributes on the record types, so encoding a whole record here is the only
//! conversion step. The remote document is the record plus two write markers:
//! `lastModified` (assigned by the server, read back only) and `deviceId`
//! (stamped by the writer for diagnostics).

pub mod wire_time;

use serde_json::{Map, Value};

use crate::error::{SyncError, SyncResult};
use crate::record::UserRecord;

/// Document key holding the server-assigned write marker.
pub const LAST_MODIFIED_KEY: &str = "lastModified";
/// Document key holding the writer's device identifier.
pub const DEVICE_ID_KEY: &str = "deviceId";

/// Encode a record into the document shape uploaded to the remote store.
///
/// `lastModified` is never sent; the server assigns it on write.
pub fn encode_document(record: &UserRecord, device_id: &str) -> SyncResult<Value> {
    let mut doc = serde_json::to_value(record)?;
    let map = doc
        .as_object_mut()
        .ok_or_else(|| SyncError::Json("user record did not encode to an object".to_string()))?;
    map.remove(LAST_MODIFIED_KEY);
    map.insert(DEVICE_ID_KEY.to_string(), Value::String(device_id.to_string()));
    Ok(doc)
}

/// Decode a remote document back into a typed record.
pub fn decode_document(doc: Value) -> SyncResult<UserRecord> {
    if !doc.is_object() {
        return Err(SyncError::RemoteOperation(format!(
            "expected user document object, got {}",
            value_kind(&doc)
        )));
    }
    Ok(serde_json::from_value(doc)?)
}

/// Decode a JSON string holding a record.
/// Convenience function for FFI.
pub fn decode_record_json(input_json: &str) -> SyncResult<UserRecord> {
    decode_document(serde_json::from_str(input_json)?)
}

/// Shallow merge-on-write: top-level fields in `incoming` replace those in
/// `stored`, fields absent from `incoming` are left untouched.
pub fn merge_on_write(stored: &mut Map<String, Value>, incoming: Map<String, Value>) {
    for (key, value) in incoming {
        stored.insert(key, value);
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
