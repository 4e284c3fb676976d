//! Dependent objects decoded from rendered manifests
//!
//! A generation pass ends with a multi-document YAML stream. This module turns
//! that stream into an ordered list of [`DecodedObject`]s, each identified by
//! its (group, version, kind, namespace, name) tuple.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::fmt;

use crate::error::{CoreError, Result};
use crate::inventory::{NameInfo, TypeInfo};

/// Kinds that are never namespaced
const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "APIService",
    "ClusterRole",
    "ClusterRoleBinding",
    "CustomResourceDefinition",
    "IngressClass",
    "MutatingWebhookConfiguration",
    "Namespace",
    "PersistentVolume",
    "PriorityClass",
    "RuntimeClass",
    "StorageClass",
    "ValidatingWebhookConfiguration",
];

pub fn is_cluster_scoped_kind(kind: &str) -> bool {
    CLUSTER_SCOPED_KINDS.contains(&kind)
}

/// Identity of a dependent object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    /// API group ("" for the core group)
    pub group: String,
    /// API version
    pub version: String,
    /// Kind
    pub kind: String,
    /// Namespace ("" for cluster-scoped or not yet defaulted objects)
    pub namespace: String,
    /// Name
    pub name: String,
}

impl ObjectKey {
    /// Build a key from an apiVersion string ("apps/v1" or "v1")
    pub fn new(
        api_version: &str,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let (group, version) = split_api_version(api_version);
        Self {
            group,
            version,
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Rebuild a key from inventory type and name information
    pub fn from_parts(type_info: &TypeInfo, name_info: &NameInfo) -> Self {
        Self {
            group: type_info.group.clone(),
            version: type_info.version.clone(),
            kind: type_info.kind.clone(),
            namespace: name_info.namespace.clone(),
            name: name_info.name.clone(),
        }
    }

    /// The apiVersion string for this key
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    pub fn type_info(&self) -> TypeInfo {
        TypeInfo {
            group: self.group.clone(),
            version: self.version.clone(),
            kind: self.kind.clone(),
        }
    }

    pub fn name_info(&self) -> NameInfo {
        NameInfo {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{} {}", self.api_version(), self.kind, self.name)
        } else {
            write!(
                f,
                "{}/{} {}/{}",
                self.api_version(),
                self.kind,
                self.namespace,
                self.name
            )
        }
    }
}

/// Split an apiVersion into (group, version)
pub fn split_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// A rendered dependent object
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedObject {
    key: ObjectKey,
    body: JsonValue,
}

impl DecodedObject {
    /// Build an object from its full structured document
    pub fn from_value(body: JsonValue) -> Result<Self> {
        let map = body.as_object().ok_or_else(|| CoreError::InvalidObject {
            message: "document is not a mapping".to_string(),
        })?;

        let api_version = required_str(map.get("apiVersion"), "apiVersion")?;
        let kind = required_str(map.get("kind"), "kind")?;
        let metadata = map.get("metadata").and_then(JsonValue::as_object);
        let name = required_str(metadata.and_then(|m| m.get("name")), "metadata.name")?;
        let namespace = metadata
            .and_then(|m| m.get("namespace"))
            .and_then(JsonValue::as_str)
            .unwrap_or_default();

        let key = ObjectKey::new(api_version, kind, namespace, name);
        Ok(Self { key, body })
    }

    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    pub fn body(&self) -> &JsonValue {
        &self.body
    }

    pub fn into_body(self) -> JsonValue {
        self.body
    }

    /// Place a namespaced object into `namespace` unless it already names one
    ///
    /// Cluster-scoped kinds are left untouched.
    pub fn set_namespace_if_missing(&mut self, namespace: &str) {
        if !self.key.namespace.is_empty()
            || namespace.is_empty()
            || is_cluster_scoped_kind(&self.key.kind)
        {
            return;
        }
        if let Some(map) = self.body.as_object_mut() {
            let metadata = map
                .entry("metadata")
                .or_insert_with(|| JsonValue::Object(serde_json::Map::new()));
            if let Some(metadata) = metadata.as_object_mut() {
                metadata.insert(
                    "namespace".to_string(),
                    JsonValue::String(namespace.to_string()),
                );
                self.key.namespace = namespace.to_string();
            }
        }
    }

    /// Serialize the object body as a YAML document
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.body)?)
    }
}

fn required_str<'a>(value: Option<&'a JsonValue>, field: &str) -> Result<&'a str> {
    match value.and_then(JsonValue::as_str) {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(CoreError::InvalidObject {
            message: format!("missing or empty field '{}'", field),
        }),
    }
}

/// Decode a multi-document YAML stream into objects
///
/// Empty documents (whitespace, comments, bare `---`) are skipped. The first
/// malformed document aborts decoding with its 0-based position.
pub fn decode_documents(text: &str) -> Result<Vec<DecodedObject>> {
    let mut objects = Vec::new();

    for (index, document) in serde_yaml::Deserializer::from_str(text).enumerate() {
        let value = JsonValue::deserialize(document).map_err(|e| CoreError::Decode {
            index,
            message: e.to_string(),
        })?;

        if value.is_null() {
            continue;
        }

        let object = DecodedObject::from_value(value).map_err(|e| CoreError::Decode {
            index,
            message: e.to_string(),
        })?;
        objects.push(object);
    }

    Ok(objects)
}

/// Serialize objects back into a multi-document YAML stream
pub fn to_documents(objects: &[DecodedObject]) -> Result<String> {
    let mut out = String::new();
    for object in objects {
        out.push_str("---\n");
        out.push_str(&object.to_yaml()?);
    }
    Ok(out)
}

/// Fail if two objects share the same identity
pub fn ensure_unique(objects: &[DecodedObject]) -> Result<()> {
    let mut seen = HashSet::with_capacity(objects.len());
    for object in objects {
        if !seen.insert(object.key()) {
            return Err(CoreError::DuplicateObject {
                key: object.key().clone(),
            });
        }
    }
    Ok(())
}
