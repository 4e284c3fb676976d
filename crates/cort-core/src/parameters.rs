//! Component parameters with deep merge support

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::Path;

use crate::error::{CoreError, Result};

/// Structured template input derived from a component spec
///
/// The value is a tagged tree (null, bool, number, string, sequence, mapping)
/// and is never mutated while a generation pass is running.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(pub JsonValue);

impl Parameters {
    /// Create empty parameters (an empty mapping)
    pub fn new() -> Self {
        Self(JsonValue::Object(serde_json::Map::new()))
    }

    /// Load parameters from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse parameters from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: JsonValue = serde_yaml::from_str(yaml)?;
        Ok(Self(value))
    }

    /// Parse parameters from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let value: JsonValue = serde_json::from_str(json)?;
        Ok(Self(value))
    }

    /// Convert a typed spec into its generic structured form
    pub fn from_serialize<T: Serialize>(spec: &T) -> Result<Self> {
        let value = serde_json::to_value(spec)?;
        match value {
            JsonValue::Object(_) | JsonValue::Null => Ok(Self(value)),
            other => Err(CoreError::InvalidParameters {
                message: format!("spec must serialize to a mapping, got {}", type_name(&other)),
            }),
        }
    }

    /// Deep merge other parameters into these
    ///
    /// Rules:
    /// - Scalars: overlay replaces base
    /// - Mappings: recursive merge
    /// - Sequences: overlay replaces base (not appended)
    pub fn merge(&mut self, overlay: &Parameters) {
        deep_merge(&mut self.0, &overlay.0);
    }

    /// Set a value by dotted path (e.g., "image.tag")
    pub fn set(&mut self, path: &str, value: JsonValue) -> Result<()> {
        let parts: Vec<&str> = path.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(CoreError::InvalidParameters {
                message: format!("invalid parameter path '{}'", path),
            });
        }
        set_nested(&mut self.0, &parts, value);
        Ok(())
    }

    /// Get a value by dotted path
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        let parts: Vec<&str> = path.split('.').collect();
        get_nested(&self.0, &parts)
    }

    /// Get the inner JSON value
    pub fn inner(&self) -> &JsonValue {
        &self.0
    }

    /// Convert to JSON value
    pub fn into_inner(self) -> JsonValue {
        self.0
    }

    /// Top-level mapping, if the parameters are a mapping
    pub fn as_mapping(&self) -> Option<&serde_json::Map<String, JsonValue>> {
        self.0.as_object()
    }

    /// Check if parameters are empty
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            JsonValue::Object(map) => map.is_empty(),
            JsonValue::Null => true,
            _ => false,
        }
    }
}

impl From<JsonValue> for Parameters {
    fn from(value: JsonValue) -> Self {
        Self(value)
    }
}

fn type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "sequence",
        JsonValue::Object(_) => "mapping",
    }
}

/// Deep merge two JSON values
fn deep_merge(base: &mut JsonValue, overlay: &JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

/// Set a nested value by path
fn set_nested(value: &mut JsonValue, path: &[&str], new_value: JsonValue) {
    let Some((key, remaining)) = path.split_first() else {
        *value = new_value;
        return;
    };

    if !value.is_object() {
        *value = JsonValue::Object(serde_json::Map::new());
    }

    if let JsonValue::Object(map) = value {
        if remaining.is_empty() {
            map.insert((*key).to_string(), new_value);
        } else {
            let entry = map
                .entry((*key).to_string())
                .or_insert_with(|| JsonValue::Object(serde_json::Map::new()));
            set_nested(entry, remaining, new_value);
        }
    }
}

/// Get a nested value by path
fn get_nested<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    let Some((key, remaining)) = path.split_first() else {
        return Some(value);
    };

    match value {
        JsonValue::Object(map) => map.get(*key).and_then(|v| get_nested(v, remaining)),
        _ => None,
    }
}

/// Parse --set arguments (key=value format)
pub fn parse_set_values(set_args: &[String]) -> Result<Parameters> {
    let mut parameters = Parameters::new();

    for arg in set_args {
        let (key, val) = arg.split_once('=').ok_or_else(|| CoreError::InvalidParameters {
            message: format!("Invalid --set format: '{}'. Expected key=value", arg),
        })?;

        // Try to parse as JSON, fallback to string
        let json_value = if val == "true" {
            JsonValue::Bool(true)
        } else if val == "false" {
            JsonValue::Bool(false)
        } else if val == "null" {
            JsonValue::Null
        } else if let Ok(num) = val.parse::<i64>() {
            JsonValue::Number(num.into())
        } else if let Some(num) = val.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
            JsonValue::Number(num)
        } else if val.starts_with('[') || val.starts_with('{') {
            serde_json::from_str(val).unwrap_or_else(|_| JsonValue::String(val.to_string()))
        } else {
            JsonValue::String(val.to_string())
        };

        parameters.set(key, json_value)?;
    }

    Ok(parameters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deep_merge() {
        let mut base = Parameters::from_yaml(r#"
image:
  repository: nginx
  tag: "1.0"
replicas: 1
ports: [80, 443]
"#).unwrap();

        let overlay = Parameters::from_yaml(r#"
image:
  tag: "2.0"
  pullPolicy: Always
replicas: 3
ports: [8080]
"#).unwrap();

        base.merge(&overlay);

        assert_eq!(base.get("image.repository").unwrap(), "nginx");
        assert_eq!(base.get("image.tag").unwrap(), "2.0");
        assert_eq!(base.get("image.pullPolicy").unwrap(), "Always");
        assert_eq!(base.get("replicas").unwrap(), 3);
        assert_eq!(base.get("ports").unwrap(), &serde_json::json!([8080]));
    }

    #[test]
    fn test_set_nested() {
        let mut parameters = Parameters::new();
        parameters.set("image.tag", JsonValue::String("v1".into())).unwrap();
        parameters.set("replicas", JsonValue::Number(3.into())).unwrap();

        assert_eq!(parameters.get("image.tag").unwrap(), "v1");
        assert_eq!(parameters.get("replicas").unwrap(), 3);
    }

    #[test]
    fn test_set_rejects_empty_segment() {
        let mut parameters = Parameters::new();
        assert!(parameters.set("image..tag", JsonValue::Null).is_err());
    }

    #[test]
    fn test_parse_set_values() {
        let args = vec![
            "image.tag=v2".to_string(),
            "replicas=5".to_string(),
            "debug=true".to_string(),
            "ratio=0.5".to_string(),
        ];

        let parameters = parse_set_values(&args).unwrap();

        assert_eq!(parameters.get("image.tag").unwrap(), "v2");
        assert_eq!(parameters.get("replicas").unwrap(), 5);
        assert_eq!(parameters.get("debug").unwrap(), true);
        assert_eq!(parameters.get("ratio").unwrap(), 0.5);
    }

    #[test]
    fn test_parse_set_values_invalid() {
        let err = parse_set_values(&["novalue".to_string()]).unwrap_err();
        assert!(err.to_string().contains("Expected key=value"));
    }

    #[test]
    fn test_from_serialize_spec() {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Spec {
            replica_count: u32,
            env: String,
        }

        let parameters = Parameters::from_serialize(&Spec {
            replica_count: 2,
            env: "prod".into(),
        })
        .unwrap();

        assert_eq!(parameters.get("replicaCount").unwrap(), 2);
        assert_eq!(parameters.get("env").unwrap(), "prod");
        assert!(Parameters::from_serialize(&vec![1, 2]).is_err());
    }

    #[test]
    fn test_is_empty() {
        assert!(Parameters::new().is_empty());
        assert!(Parameters(JsonValue::Null).is_empty());
        assert!(!Parameters::from_yaml("env: prod").unwrap().is_empty());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("values.yaml");
        std::fs::write(&path, "image:\n  tag: \"1.27\"\n").unwrap();

        let parameters = Parameters::from_file(&path).unwrap();
        assert_eq!(parameters.get("image.tag").unwrap(), "1.27");
        assert!(Parameters::from_file(dir.path().join("missing.yaml")).is_err());
    }
}
