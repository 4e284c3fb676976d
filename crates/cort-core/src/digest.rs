//! Canonical content digests for object bodies

use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::error::{CoreError, Result};
use crate::object::DecodedObject;

/// Rebuild a value with every mapping's keys in lexical order
pub fn canonicalize(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let sorted: BTreeMap<&String, JsonValue> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            let mut out = serde_json::Map::with_capacity(sorted.len());
            for (k, v) in sorted {
                out.insert(k.clone(), v);
            }
            JsonValue::Object(out)
        }
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// SHA-256 over the compact canonical JSON form, hex encoded
pub fn digest(value: &JsonValue) -> Result<String> {
    let bytes = serde_json::to_vec(&canonicalize(value)).map_err(|e| CoreError::Digest {
        key: "<body>".to_string(),
        message: e.to_string(),
    })?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Digest of an object's body, with the object identity on failure
pub fn digest_object(object: &DecodedObject) -> Result<String> {
    digest(object.body()).map_err(|e| match e {
        CoreError::Digest { message, .. } => CoreError::Digest {
            key: object.key().to_string(),
            message,
        },
        other => other,
    })
}
