//! Accessors for untyped resource documents

use serde_json::{Map, Value as JsonValue};

fn str_at<'a>(object: &'a JsonValue, pointer: &str) -> &'a str {
    object.pointer(pointer).and_then(JsonValue::as_str).unwrap_or_default()
}

pub fn api_version(object: &JsonValue) -> &str {
    str_at(object, "/apiVersion")
}

pub fn kind(object: &JsonValue) -> &str {
    str_at(object, "/kind")
}

pub fn name(object: &JsonValue) -> &str {
    str_at(object, "/metadata/name")
}

pub fn namespace(object: &JsonValue) -> &str {
    str_at(object, "/metadata/namespace")
}

pub fn is_cluster_scoped(object: &JsonValue) -> bool {
    cort_core::object::is_cluster_scoped_kind(kind(object))
}

/// The mapping at `path` below the root, created when missing
///
/// Returns `None` when a value on the way is not a mapping.
pub fn mapping_at<'a>(
    object: &'a mut JsonValue,
    path: &[&str],
) -> Option<&'a mut Map<String, JsonValue>> {
    let mut current = object.as_object_mut()?;
    for segment in path {
        current = current
            .entry(segment.to_string())
            .or_insert_with(|| JsonValue::Object(Map::new()))
            .as_object_mut()?;
    }
    Some(current)
}

pub fn metadata_mut(object: &mut JsonValue) -> Option<&mut Map<String, JsonValue>> {
    mapping_at(object, &["metadata"])
}

pub fn set_name(object: &mut JsonValue, name: String) {
    if let Some(metadata) = metadata_mut(object) {
        metadata.insert("name".to_string(), JsonValue::String(name));
    }
}

pub fn set_namespace(object: &mut JsonValue, namespace: &str) {
    if let Some(metadata) = metadata_mut(object) {
        metadata.insert(
            "namespace".to_string(),
            JsonValue::String(namespace.to_string()),
        );
    }
}

/// Identity string used in messages
pub fn describe(object: &JsonValue) -> String {
    let ns = namespace(object);
    if ns.is_empty() {
        format!("{}/{} {}", api_version(object), kind(object), name(object))
    } else {
        format!("{}/{} {}/{}", api_version(object), kind(object), ns, name(object))
    }
}
