//! Strategic merge and JSON6902 patches

use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

use super::kustomization::PatchTarget;
use super::resource;
use crate::error::CompositionError;

/// A parsed patch document
#[derive(Debug, Clone)]
pub enum Patch {
    /// One or more partial objects merged into their targets
    StrategicMerge(Vec<JsonValue>),
    /// RFC 6902 operation list
    Json6902(json_patch::Patch),
}

impl Patch {
    /// Parse patch text; a YAML sequence is an operation list, mappings are
    /// strategic merge patches
    pub fn parse(text: &str, label: &str) -> Result<Self, CompositionError> {
        let invalid = |message: String| CompositionError::InvalidPatch {
            patch: label.to_string(),
            message,
        };

        let mut documents = Vec::new();
        for document in serde_yaml::Deserializer::from_str(text) {
            let value = JsonValue::deserialize(document).map_err(|e| invalid(e.to_string()))?;
            if !value.is_null() {
                documents.push(value);
            }
        }

        if documents.is_empty() {
            return Err(invalid("patch is empty".to_string()));
        }

        if documents.len() == 1 && documents[0].is_array() {
            let operations = documents.remove(0);
            return serde_json::from_value(operations)
                .map(Patch::Json6902)
                .map_err(|e| invalid(e.to_string()));
        }

        if documents.iter().all(JsonValue::is_object) {
            Ok(Patch::StrategicMerge(documents))
        } else {
            Err(invalid("expected a mapping or a list of operations".to_string()))
        }
    }
}

impl PatchTarget {
    /// Whether `object` is selected
    pub fn matches(&self, object: &JsonValue) -> bool {
        let (group, version) = cort_core::object::split_api_version(resource::api_version(object));

        field_matches(&self.group, &group)
            && field_matches(&self.version, &version)
            && field_matches(&self.kind, resource::kind(object))
            && field_matches(&self.name, resource::name(object))
            && field_matches(&self.namespace, resource::namespace(object))
            && self
                .label_selector
                .as_deref()
                .is_none_or(|selector| labels_match(selector, object))
    }
}

fn field_matches(expected: &Option<String>, actual: &str) -> bool {
    expected
        .as_deref()
        .is_none_or(|expected| expected.is_empty() || expected == actual)
}

/// Equality-based label selector: `a=b,c==d,e` (bare key means "present")
fn labels_match(selector: &str, object: &JsonValue) -> bool {
    let labels = object.pointer("/metadata/labels").and_then(JsonValue::as_object);

    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| {
            let (key, value) = match term.split_once("==").or_else(|| term.split_once('=')) {
                Some((key, value)) => (key.trim(), Some(value.trim())),
                None => (term, None),
            };
            match (labels.and_then(|l| l.get(key)), value) {
                (Some(actual), Some(value)) => actual.as_str() == Some(value),
                (Some(_), None) => true,
                (None, _) => false,
            }
        })
}

/// Selector implied by a strategic merge patch's own identity
fn implied_target(patch: &JsonValue) -> PatchTarget {
    let (group, _) = cort_core::object::split_api_version(resource::api_version(patch));
    let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());

    PatchTarget {
        group: Some(group),
        version: None,
        kind: non_empty(resource::kind(patch)),
        name: non_empty(resource::name(patch)),
        namespace: non_empty(resource::namespace(patch)),
        label_selector: None,
    }
}

/// Patch body without the identity fields, so an explicit target keeps its own
fn strip_identity(patch: &JsonValue) -> JsonValue {
    let mut body = patch.clone();
    if let Some(map) = body.as_object_mut() {
        map.remove("apiVersion");
        map.remove("kind");
        if let Some(metadata) = map.get_mut("metadata").and_then(JsonValue::as_object_mut) {
            metadata.remove("name");
            metadata.remove("namespace");
        }
    }
    body
}

fn is_delete_directive(value: &JsonValue) -> bool {
    value.get("$patch").and_then(JsonValue::as_str) == Some("delete")
}

/// Apply a patch to the accumulated resources
///
/// Every patch must select at least one resource.
pub fn apply(
    resources: &mut Vec<JsonValue>,
    patch: &Patch,
    target: Option<&PatchTarget>,
    label: &str,
) -> Result<(), CompositionError> {
    let not_found = || CompositionError::PatchTargetNotFound {
        patch: label.to_string(),
    };

    match patch {
        Patch::Json6902(operations) => {
            let target = target.ok_or_else(|| CompositionError::InvalidPatch {
                patch: label.to_string(),
                message: "JSON6902 patches require a target".to_string(),
            })?;

            let mut matched = false;
            for object in resources.iter_mut().filter(|o| target.matches(o)) {
                json_patch::patch(object, &operations.0).map_err(|e| {
                    CompositionError::InvalidPatch {
                        patch: label.to_string(),
                        message: e.to_string(),
                    }
                })?;
                matched = true;
            }
            if !matched {
                return Err(not_found());
            }
        }
        Patch::StrategicMerge(documents) => {
            for document in documents {
                let (selector, body) = match target {
                    Some(target) => (target.clone(), strip_identity(document)),
                    None => (implied_target(document), document.clone()),
                };

                if !resources.iter().any(|o| selector.matches(o)) {
                    return Err(not_found());
                }

                if is_delete_directive(&body) {
                    resources.retain(|o| !selector.matches(o));
                    continue;
                }

                for object in resources.iter_mut().filter(|o| selector.matches(o)) {
                    strategic_merge(object, &body);
                }
            }
        }
    }

    tracing::trace!(patch = label, "applied patch");
    Ok(())
}

/// Merge `patch` into `target`
///
/// Mappings merge recursively and a `null` value deletes the key. Lists whose
/// elements are all mappings carrying `name` merge element-wise by name, any
/// other list is replaced. `$patch: replace` replaces a mapping outright and
/// `$patch: delete` on a named list element removes that element.
pub fn strategic_merge(target: &mut JsonValue, patch: &JsonValue) {
    let Some(patch_map) = patch.as_object() else {
        *target = patch.clone();
        return;
    };

    if patch_map.get("$patch").and_then(JsonValue::as_str) == Some("replace") {
        let mut replacement = patch_map.clone();
        replacement.remove("$patch");
        *target = JsonValue::Object(replacement);
        return;
    }

    if !target.is_object() {
        *target = JsonValue::Object(Map::new());
    }
    let Some(target_map) = target.as_object_mut() else {
        return;
    };

    for (key, value) in patch_map {
        if key == "$patch" {
            continue;
        }
        if value.is_null() {
            target_map.remove(key);
            continue;
        }

        match (target_map.get_mut(key), value) {
            (Some(existing @ JsonValue::Object(_)), JsonValue::Object(_)) => {
                strategic_merge(existing, value);
            }
            (Some(JsonValue::Array(existing)), JsonValue::Array(items))
                if !items.is_empty() && is_named_list(existing) && is_named_list(items) =>
            {
                merge_named_lists(existing, items);
            }
            _ => {
                target_map.insert(key.clone(), without_directives(value));
            }
        }
    }
}

fn element_name(value: &JsonValue) -> Option<&str> {
    value.get("name").and_then(JsonValue::as_str)
}

fn is_named_list(items: &[JsonValue]) -> bool {
    items.iter().all(|item| element_name(item).is_some())
}

fn merge_named_lists(existing: &mut Vec<JsonValue>, items: &[JsonValue]) {
    for item in items {
        let Some(name) = element_name(item) else {
            continue;
        };

        if is_delete_directive(item) {
            existing.retain(|e| element_name(e) != Some(name));
            continue;
        }

        match existing.iter_mut().find(|e| element_name(e) == Some(name)) {
            Some(current) => strategic_merge(current, item),
            None => existing.push(without_directives(item)),
        }
    }
}

/// Copy of a patch value with `$patch` keys and null deletions dropped
fn without_directives(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => JsonValue::Object(
            map.iter()
                .filter(|(k, v)| k.as_str() != "$patch" && !v.is_null())
                .map(|(k, v)| (k.clone(), without_directives(v)))
                .collect(),
        ),
        JsonValue::Array(items) => JsonValue::Array(
            items
                .iter()
                .filter(|item| !is_delete_directive(item))
                .map(without_directives)
                .collect(),
        ),
        other => other.clone(),
    }
}
