#![forbid(unsafe_code)]

use super::super::StoreError;
use gw_core::graph::DataMap;

pub(in crate::store) fn encode_map(map: &DataMap) -> Result<String, StoreError> {
    Ok(serde_json::to_string(map)?)
}

/// Stored payloads are always objects; anything else means the row was written by
/// something other than this store.
pub(in crate::store) fn decode_map(raw: &str) -> Result<DataMap, StoreError> {
    match serde_json::from_str::<serde_json::Value>(raw)? {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err(StoreError::InvalidInput("stored payload is not a json object")),
    }
}

/// Shallow overlay: keys in `fields` replace keys in `base`; a `null` value removes the key.
pub(in crate::store) fn overlay_fields(base: &DataMap, fields: &DataMap) -> DataMap {
    let mut out = base.clone();
    for (key, value) in fields {
        if value.is_null() {
            out.remove(key);
        } else {
            out.insert(key.clone(), value.clone());
        }
    }
    out
}
