//! ConfigMap and Secret generators

use base64::Engine as _;
use serde_json::{Map, Value as JsonValue, json};
use std::collections::BTreeMap;

use super::builtins;
use super::kustomization::{GeneratorArgs, GeneratorBehavior, GeneratorOptions};
use super::resource;
use crate::error::CompositionError;
use crate::vfs::VirtualFs;

/// Internal marker for objects whose name still needs the content hash suffix
pub const NEEDS_HASH_ANNOTATION: &str = "internal.cort.io/needs-hash";

/// Length of the hex content hash appended to generated names
const HASH_LENGTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratedKind {
    ConfigMap,
    Secret,
}

impl GeneratedKind {
    fn as_str(self) -> &'static str {
        match self {
            GeneratedKind::ConfigMap => "ConfigMap",
            GeneratedKind::Secret => "Secret",
        }
    }
}

/// Collected key/value pairs, bytes for file sources
struct Entries {
    name: String,
    values: BTreeMap<String, Vec<u8>>,
}

impl Entries {
    fn insert(&mut self, key: &str, value: Vec<u8>) -> Result<(), CompositionError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(self.error("empty key"));
        }
        if self.values.insert(key.to_string(), value).is_some() {
            return Err(self.error(format!("duplicate key '{}'", key)));
        }
        Ok(())
    }

    fn error(&self, message: impl Into<String>) -> CompositionError {
        CompositionError::Generator {
            name: self.name.clone(),
            message: message.into(),
        }
    }
}

fn collect(fs: &VirtualFs, dir: &str, args: &GeneratorArgs) -> Result<Entries, CompositionError> {
    let mut entries = Entries {
        name: args.name.clone(),
        values: BTreeMap::new(),
    };

    for literal in &args.literals {
        let (key, value) = literal
            .split_once('=')
            .ok_or_else(|| entries.error(format!("literal '{}' is not key=value", literal)))?;
        entries.insert(key, value.as_bytes().to_vec())?;
    }

    for file in &args.files {
        let (key, path) = match file.split_once('=') {
            Some((key, path)) => (key.to_string(), path),
            None => {
                let base = file.rsplit('/').next().unwrap_or(file);
                (base.to_string(), file.as_str())
            }
        };
        let path = VirtualFs::join(dir, path)?;
        let content = fs
            .read(&path)
            .map_err(|e| entries.error(e.to_string()))?
            .to_vec();
        entries.insert(&key, content)?;
    }

    for env in &args.envs {
        let path = VirtualFs::join(dir, env)?;
        let text = fs
            .read_to_string(&path)
            .map_err(|e| entries.error(e.to_string()))?;

        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                entries.error(format!("{}:{}: invalid env line '{}'", path, number + 1, line))
            })?;
            entries.insert(key, value.as_bytes().to_vec())?;
        }
    }

    Ok(entries)
}

/// Build the data fields for the generated object
fn data_fields(kind: GeneratedKind, entries: Entries) -> Map<String, JsonValue> {
    let engine = &base64::engine::general_purpose::STANDARD;
    let mut data = Map::new();
    let mut binary = Map::new();

    for (key, value) in entries.values {
        match kind {
            GeneratedKind::Secret => {
                data.insert(key, JsonValue::String(engine.encode(&value)));
            }
            GeneratedKind::ConfigMap => match String::from_utf8(value) {
                Ok(text) => {
                    data.insert(key, JsonValue::String(text));
                }
                Err(e) => {
                    binary.insert(key, JsonValue::String(engine.encode(e.as_bytes())));
                }
            },
        }
    }

    let mut fields = Map::new();
    if !data.is_empty() {
        fields.insert("data".to_string(), JsonValue::Object(data));
    }
    if !binary.is_empty() {
        fields.insert("binaryData".to_string(), JsonValue::Object(binary));
    }
    fields
}

fn find_existing<'a>(
    resources: &'a mut [JsonValue],
    kind: GeneratedKind,
    args: &GeneratorArgs,
) -> Option<&'a mut JsonValue> {
    resources.iter_mut().find(|object| {
        resource::kind(object) == kind.as_str()
            && resource::name(object) == args.name
            && args
                .namespace
                .as_deref()
                .is_none_or(|ns| resource::namespace(object) == ns)
    })
}

/// Run one generator entry against the resources accumulated so far
pub fn generate(
    fs: &VirtualFs,
    dir: &str,
    kind: GeneratedKind,
    args: &GeneratorArgs,
    global: &GeneratorOptions,
    resources: &mut Vec<JsonValue>,
) -> Result<(), CompositionError> {
    if args.name.is_empty() {
        return Err(CompositionError::Generator {
            name: format!("{} in {}", kind.as_str(), super::kustomization::display_dir(dir)),
            message: "missing name".to_string(),
        });
    }

    let options = global.overlay(args.options.as_ref());
    let fields = data_fields(kind, collect(fs, dir, args)?);

    match args.behavior {
        GeneratorBehavior::Create => {
            let mut object = json!({
                "apiVersion": "v1",
                "kind": kind.as_str(),
                "metadata": {"name": args.name},
            });
            if let Some(ns) = &args.namespace {
                resource::set_namespace(&mut object, ns);
            }
            if kind == GeneratedKind::Secret {
                let secret_type = args.secret_type.as_deref().unwrap_or("Opaque");
                if let Some(map) = object.as_object_mut() {
                    map.insert("type".to_string(), JsonValue::String(secret_type.to_string()));
                }
            }
            if let Some(map) = object.as_object_mut() {
                map.extend(fields);
            }

            builtins::add_labels(&mut object, &options.labels, false);
            builtins::add_annotations(&mut object, &options.annotations, false);
            if !options.disable_name_suffix_hash {
                mark_for_hash(&mut object);
            }

            tracing::trace!(name = %args.name, kind = kind.as_str(), "generated object");
            resources.push(object);
        }
        GeneratorBehavior::Merge | GeneratorBehavior::Replace => {
            let existing =
                find_existing(resources, kind, args).ok_or_else(|| CompositionError::Generator {
                    name: args.name.clone(),
                    message: format!("no existing {} to {}", kind.as_str(), behavior_name(args.behavior)),
                })?;

            let Some(map) = existing.as_object_mut() else {
                return Err(CompositionError::Generator {
                    name: args.name.clone(),
                    message: "existing object is not a mapping".to_string(),
                });
            };

            if args.behavior == GeneratorBehavior::Replace {
                map.remove("data");
                map.remove("binaryData");
            }
            for (field, values) in fields {
                let JsonValue::Object(values) = values else {
                    continue;
                };
                match map.get_mut(&field).and_then(JsonValue::as_object_mut) {
                    Some(current) => current.extend(values),
                    None => {
                        map.insert(field, JsonValue::Object(values));
                    }
                }
            }

            builtins::add_labels(existing, &options.labels, false);
            builtins::add_annotations(existing, &options.annotations, false);
        }
    }

    Ok(())
}

fn behavior_name(behavior: GeneratorBehavior) -> &'static str {
    match behavior {
        GeneratorBehavior::Create => "create",
        GeneratorBehavior::Merge => "merge",
        GeneratorBehavior::Replace => "replace",
    }
}

fn mark_for_hash(object: &mut JsonValue) {
    if let Some(annotations) = resource::mapping_at(object, &["metadata", "annotations"]) {
        annotations.insert(NEEDS_HASH_ANNOTATION.to_string(), JsonValue::String("true".to_string()));
    }
}

/// Content hash over kind, name and data fields
pub fn content_hash(object: &JsonValue) -> Result<String, CompositionError> {
    let mut hashed = Map::new();
    for field in ["kind", "type", "data", "binaryData"] {
        if let Some(value) = object.get(field) {
            hashed.insert(field.to_string(), value.clone());
        }
    }
    hashed.insert("name".to_string(), JsonValue::String(resource::name(object).to_string()));

    let digest = cort_core::digest(&JsonValue::Object(hashed)).map_err(|e| {
        CompositionError::Generator {
            name: resource::name(object).to_string(),
            message: e.to_string(),
        }
    })?;
    Ok(digest[..HASH_LENGTH].to_string())
}

/// Append the content hash to every marked object and update references
pub fn apply_hash_suffixes(resources: &mut [JsonValue]) -> Result<(), CompositionError> {
    for index in 0..resources.len() {
        let object = &mut resources[index];
        let Some(annotations) = object
            .pointer_mut("/metadata/annotations")
            .and_then(JsonValue::as_object_mut)
        else {
            continue;
        };
        if annotations.remove(NEEDS_HASH_ANNOTATION).is_none() {
            continue;
        }
        if annotations.is_empty()
            && let Some(metadata) = resource::metadata_mut(object)
        {
            metadata.remove("annotations");
        }

        let old_name = resource::name(object).to_string();
        let new_name = format!("{}-{}", old_name, content_hash(object)?);
        let kind = resource::kind(object).to_string();
        let namespace = resource::namespace(object).to_string();
        resource::set_name(object, new_name.clone());

        builtins::rename_references(resources, &kind, &namespace, &old_name, &new_name);
    }
    Ok(())
}
