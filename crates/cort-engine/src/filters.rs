//! Template filters
//!
//! Pure functions shared by every engine instance. They cover the string,
//! encoding and mapping helpers manifests typically need.

use base64::Engine as _;
use minijinja::{Error, ErrorKind, Value};
use sha2::{Digest, Sha256};

fn invalid(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.into())
}

fn to_json(value: &Value) -> Result<serde_json::Value, Error> {
    serde_json::to_value(value).map_err(|e| invalid(e.to_string()))
}

/// Convert a value to YAML format
///
/// Usage: {{ config | toyaml }}
pub fn toyaml(value: Value) -> Result<String, Error> {
    let yaml = serde_yaml::to_string(&to_json(&value)?).map_err(|e| invalid(e.to_string()))?;
    Ok(yaml.trim_start_matches("---\n").trim_end().to_string())
}

/// Convert a value to compact JSON
///
/// Usage: {{ config | tojson }}
pub fn tojson(value: Value) -> Result<String, Error> {
    serde_json::to_string(&to_json(&value)?).map_err(|e| invalid(e.to_string()))
}

/// Parse a YAML string into a value
///
/// Usage: {{ (raw | fromyaml).key }}
pub fn fromyaml(value: String) -> Result<Value, Error> {
    let parsed: serde_json::Value =
        serde_yaml::from_str(&value).map_err(|e| invalid(format!("invalid YAML: {}", e)))?;
    Ok(Value::from_serialize(&parsed))
}

/// Parse a JSON string into a value
pub fn fromjson(value: String) -> Result<Value, Error> {
    let parsed: serde_json::Value =
        serde_json::from_str(&value).map_err(|e| invalid(format!("invalid JSON: {}", e)))?;
    Ok(Value::from_serialize(&parsed))
}

#[must_use]
pub fn b64encode(value: String) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}

pub fn b64decode(value: String) -> Result<String, Error> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(value.as_bytes())
        .map_err(|e| invalid(format!("base64 decode error: {}", e)))?;

    String::from_utf8(decoded).map_err(|e| invalid(format!("UTF-8 decode error: {}", e)))
}

fn display_string(value: &Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    }
}

/// Quote a string with double quotes
///
/// Usage: {{ name | quote }}
#[must_use]
pub fn quote(value: Value) -> String {
    let s = display_string(&value);
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Quote a string with single quotes (YAML escaping)
#[must_use]
pub fn squote(value: Value) -> String {
    format!("'{}'", display_string(&value).replace('\'', "''"))
}

/// Indent text with a newline prefix
///
/// Usage: {{ content | nindent(4) }}
#[must_use]
pub fn nindent(value: String, spaces: usize) -> String {
    let mut result = String::with_capacity(1 + value.len() + spaces * value.lines().count());
    result.push('\n');
    result.push_str(&indent(value, spaces));
    result
}

/// Indent every non-empty line
///
/// Usage: {{ content | indent(4) }}
pub fn indent(value: String, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    value
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", pad, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Require a value, fail if undefined or empty
///
/// Usage: {{ database.host | required("database.host is required") }}
pub fn required(value: Value, message: Option<String>) -> Result<Value, Error> {
    if value.is_undefined() || value.is_none() {
        Err(invalid(message.unwrap_or_else(|| "required value is missing".to_string())))
    } else if value.as_str().is_some_and(str::is_empty) {
        Err(invalid(message.unwrap_or_else(|| "required value is empty".to_string())))
    } else {
        Ok(value)
    }
}

/// Check if a value is empty
///
/// Usage: {% if ports | empty %}
pub fn empty(value: Value) -> bool {
    if value.is_undefined() || value.is_none() {
        return true;
    }

    match value.len() {
        Some(len) => len == 0,
        None => value.as_str().is_some_and(str::is_empty),
    }
}

/// Check if a mapping has a key
///
/// Usage: {% if labels | haskey("app") %}
pub fn haskey(value: Value, key: String) -> bool {
    value.get_attr(&key).map(|v| !v.is_undefined()).unwrap_or(false)
}

/// Keys of a mapping
pub fn keys(value: Value) -> Result<Vec<String>, Error> {
    let iter = value
        .try_iter()
        .map_err(|_| invalid("cannot get keys from non-mapping value"))?;
    Ok(iter.filter_map(|v| v.as_str().map(str::to_string)).collect())
}

/// Deep merge two mappings
///
/// Usage: {{ defaults | merge(overrides) }}
pub fn merge(base: Value, overlay: Value) -> Result<Value, Error> {
    let mut base = cort_core::Parameters::from(to_json(&base)?);
    base.merge(&cort_core::Parameters::from(to_json(&overlay)?));
    Ok(Value::from_serialize(base.inner()))
}

/// SHA-256 hash of a string, hex encoded
pub fn sha256sum(value: String) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

/// Truncate a string to a maximum number of characters
///
/// Usage: {{ name | trunc(63) }}
pub fn trunc(value: String, length: usize) -> String {
    if value.chars().count() <= length {
        value
    } else {
        value.chars().take(length).collect()
    }
}

pub fn trimprefix(value: String, prefix: String) -> String {
    value.strip_prefix(prefix.as_str()).unwrap_or(&value).to_string()
}

pub fn trimsuffix(value: String, suffix: String) -> String {
    value.strip_suffix(suffix.as_str()).unwrap_or(&value).to_string()
}
