//! Built-in transformers: namespace, name prefix/suffix, labels, annotations, images

use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use super::kustomization::ImageOverride;
use super::resource;

/// Workload kinds whose pod template and selector follow common labels
const SELECTOR_KINDS: &[&str] = &["Deployment", "StatefulSet", "DaemonSet", "ReplicaSet"];

/// Kinds whose names are never prefixed or suffixed
const FIXED_NAME_KINDS: &[&str] = &["Namespace", "CustomResourceDefinition"];

/// Kinds renamed references are tracked for
const REFERABLE_KINDS: &[&str] = &[
    "ConfigMap",
    "Secret",
    "Service",
    "ServiceAccount",
    "PersistentVolumeClaim",
];

/// (referenced kind, field holding a reference object, name keys inside it)
const REFERENCE_OBJECTS: &[(&str, &str, &[&str])] = &[
    ("ConfigMap", "configMap", &["name"]),
    ("ConfigMap", "configMapRef", &["name"]),
    ("ConfigMap", "configMapKeyRef", &["name"]),
    ("Secret", "secret", &["secretName", "name"]),
    ("Secret", "secretRef", &["name"]),
    ("Secret", "secretKeyRef", &["name"]),
    ("Service", "service", &["name"]),
    ("PersistentVolumeClaim", "persistentVolumeClaim", &["claimName"]),
];

/// (referenced kind, field holding the name as a plain string)
const REFERENCE_STRINGS: &[(&str, &str)] = &[
    ("ServiceAccount", "serviceAccountName"),
    ("Service", "serviceName"),
];

fn insert_all(map: &mut serde_json::Map<String, JsonValue>, values: &BTreeMap<String, String>) {
    for (key, value) in values {
        map.insert(key.clone(), JsonValue::String(value.clone()));
    }
}

/// Add labels to the object, and to selectors and pod templates when
/// `include_selectors` is set
pub fn add_labels(object: &mut JsonValue, labels: &BTreeMap<String, String>, include_selectors: bool) {
    if labels.is_empty() {
        return;
    }
    if let Some(map) = resource::mapping_at(object, &["metadata", "labels"]) {
        insert_all(map, labels);
    }
    if !include_selectors {
        return;
    }

    let kind = resource::kind(object).to_string();
    let paths: &[&[&str]] = match kind.as_str() {
        k if SELECTOR_KINDS.contains(&k) => &[
            &["spec", "selector", "matchLabels"],
            &["spec", "template", "metadata", "labels"],
        ],
        "Job" => &[&["spec", "template", "metadata", "labels"]],
        "CronJob" => &[&["spec", "jobTemplate", "spec", "template", "metadata", "labels"]],
        "Service" => &[&["spec", "selector"]],
        _ => &[],
    };
    for path in paths {
        if let Some(map) = resource::mapping_at(object, path) {
            insert_all(map, labels);
        }
    }
}

/// Add annotations to the object, and to pod templates when `include_templates` is set
pub fn add_annotations(
    object: &mut JsonValue,
    annotations: &BTreeMap<String, String>,
    include_templates: bool,
) {
    if annotations.is_empty() {
        return;
    }
    if let Some(map) = resource::mapping_at(object, &["metadata", "annotations"]) {
        insert_all(map, annotations);
    }
    if !include_templates {
        return;
    }

    let kind = resource::kind(object).to_string();
    let path: &[&str] = match kind.as_str() {
        k if SELECTOR_KINDS.contains(&k) || k == "Job" => &["spec", "template", "metadata", "annotations"],
        "CronJob" => &["spec", "jobTemplate", "spec", "template", "metadata", "annotations"],
        _ => return,
    };
    if let Some(map) = resource::mapping_at(object, path) {
        insert_all(map, annotations);
    }
}

/// Move every namespaced object into `namespace`
///
/// ServiceAccount subjects of role bindings that name an included
/// ServiceAccount follow it.
pub fn set_namespace(resources: &mut [JsonValue], namespace: &str) {
    let service_accounts: Vec<String> = resources
        .iter()
        .filter(|o| resource::kind(o) == "ServiceAccount")
        .map(|o| resource::name(o).to_string())
        .collect();

    for object in resources.iter_mut() {
        if !resource::is_cluster_scoped(object) {
            resource::set_namespace(object, namespace);
        }

        if !matches!(resource::kind(object), "RoleBinding" | "ClusterRoleBinding") {
            continue;
        }
        let Some(subjects) = object.get_mut("subjects").and_then(JsonValue::as_array_mut) else {
            continue;
        };
        for subject in subjects.iter_mut().filter_map(JsonValue::as_object_mut) {
            let is_included_account = subject.get("kind").and_then(JsonValue::as_str)
                == Some("ServiceAccount")
                && subject
                    .get("name")
                    .and_then(JsonValue::as_str)
                    .is_some_and(|name| service_accounts.iter().any(|sa| sa == name));
            if is_included_account {
                subject.insert(
                    "namespace".to_string(),
                    JsonValue::String(namespace.to_string()),
                );
            }
        }
    }
}

/// Apply a name prefix and suffix, updating references to renamed objects
pub fn add_name_affixes(resources: &mut [JsonValue], prefix: &str, suffix: &str) {
    if prefix.is_empty() && suffix.is_empty() {
        return;
    }

    let mut renamed = Vec::new();
    for object in resources.iter_mut() {
        let kind = resource::kind(object).to_string();
        if FIXED_NAME_KINDS.contains(&kind.as_str()) {
            continue;
        }
        let old = resource::name(object).to_string();
        let new = format!("{}{}{}", prefix, old, suffix);
        resource::set_name(object, new.clone());
        if REFERABLE_KINDS.contains(&kind.as_str()) {
            renamed.push((kind, resource::namespace(object).to_string(), old, new));
        }
    }

    for (kind, namespace, old, new) in renamed {
        rename_references(resources, &kind, &namespace, &old, &new);
    }
}

/// Rewrite references to a renamed object in every object of its namespace
///
/// Covers pod volume and environment sources, image pull secrets, service
/// account names, and nested `{kind, name}` references such as role binding
/// subjects.
pub fn rename_references(
    resources: &mut [JsonValue],
    kind: &str,
    namespace: &str,
    old: &str,
    new: &str,
) {
    for object in resources.iter_mut() {
        let object_ns = resource::namespace(object);
        if !namespace.is_empty() && !object_ns.is_empty() && object_ns != namespace {
            continue;
        }

        let Some(map) = object.as_object_mut() else {
            continue;
        };
        for (key, value) in map.iter_mut() {
            if key != "metadata" {
                rewrite(value, kind, old, new);
            }
        }
    }
}

fn rename_field(map: &mut serde_json::Map<String, JsonValue>, field: &str, old: &str, new: &str) {
    if let Some(value) = map.get_mut(field)
        && value.as_str() == Some(old)
    {
        *value = JsonValue::String(new.to_string());
    }
}

fn rewrite(value: &mut JsonValue, kind: &str, old: &str, new: &str) {
    match value {
        JsonValue::Object(map) => {
            if map.get("kind").and_then(JsonValue::as_str) == Some(kind) {
                rename_field(map, "name", old, new);
            }

            for (field, holder, name_keys) in REFERENCE_OBJECTS {
                if *field != kind {
                    continue;
                }
                if let Some(reference) = map.get_mut(*holder).and_then(JsonValue::as_object_mut) {
                    for name_key in *name_keys {
                        rename_field(reference, name_key, old, new);
                    }
                }
            }

            for (field, holder) in REFERENCE_STRINGS {
                if *field == kind {
                    rename_field(map, holder, old, new);
                }
            }

            if kind == "Secret"
                && let Some(secrets) = map.get_mut("imagePullSecrets").and_then(JsonValue::as_array_mut)
            {
                for secret in secrets.iter_mut().filter_map(JsonValue::as_object_mut) {
                    rename_field(secret, "name", old, new);
                }
            }

            for child in map.values_mut() {
                rewrite(child, kind, old, new);
            }
        }
        JsonValue::Array(items) => {
            for item in items {
                rewrite(item, kind, old, new);
            }
        }
        _ => {}
    }
}

/// Split an image reference into (name, tag, digest)
fn split_image(image: &str) -> (&str, Option<&str>, Option<&str>) {
    let (rest, digest) = match image.split_once('@') {
        Some((rest, digest)) => (rest, Some(digest)),
        None => (image, None),
    };

    let name_start = rest.rfind('/').map_or(0, |i| i + 1);
    match rest[name_start..].rfind(':') {
        Some(colon) => {
            let colon = name_start + colon;
            (&rest[..colon], Some(&rest[colon + 1..]), digest)
        }
        None => (rest, None, digest),
    }
}

fn override_image(image: &str, overrides: &[ImageOverride]) -> Option<String> {
    let (name, tag, digest) = split_image(image);
    let rule = overrides.iter().find(|rule| rule.name == name)?;

    let new_name = rule.new_name.as_deref().unwrap_or(name);
    Some(match (&rule.digest, &rule.new_tag) {
        (Some(digest), _) => format!("{}@{}", new_name, digest),
        (None, Some(tag)) => format!("{}:{}", new_name, tag),
        (None, None) => {
            let mut out = new_name.to_string();
            if let Some(tag) = tag {
                out.push(':');
                out.push_str(tag);
            }
            if let Some(digest) = digest {
                out.push('@');
                out.push_str(digest);
            }
            out
        }
    })
}

/// Rewrite container images matching an override
pub fn set_images(object: &mut JsonValue, overrides: &[ImageOverride]) {
    if overrides.is_empty() {
        return;
    }
    match object {
        JsonValue::Object(map) => {
            for (key, value) in map.iter_mut() {
                if (key == "containers" || key == "initContainers")
                    && let Some(containers) = value.as_array_mut()
                {
                    for container in containers.iter_mut().filter_map(JsonValue::as_object_mut) {
                        let replacement = container
                            .get("image")
                            .and_then(JsonValue::as_str)
                            .and_then(|image| override_image(image, overrides));
                        if let Some(replacement) = replacement {
                            container.insert("image".to_string(), JsonValue::String(replacement));
                        }
                    }
                } else {
                    set_images(value, overrides);
                }
            }
        }
        JsonValue::Array(items) => {
            for item in items {
                set_images(item, overrides);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deployment() -> JsonValue {
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "web"},
            "spec": {
                "selector": {"matchLabels": {"app": "web"}},
                "template": {
                    "metadata": {"labels": {"app": "web"}},
                    "spec": {
                        "serviceAccountName": "runner",
                        "imagePullSecrets": [{"name": "registry"}],
                        "containers": [{
                            "name": "app",
                            "image": "registry.local:5000/team/nginx:1.24",
                            "envFrom": [{"configMapRef": {"name": "settings"}}]
                        }],
                        "volumes": [{"name": "creds", "secret": {"secretName": "registry"}}]
                    }
                }
            }
        })
    }

    #[test]
    fn test_labels_reach_selectors() {
        let mut object = deployment();
        let labels = BTreeMap::from([("team".to_string(), "shop".to_string())]);
        add_labels(&mut object, &labels, true);

        assert_eq!(object.pointer("/metadata/labels/team"), Some(&json!("shop")));
        assert_eq!(object.pointer("/spec/selector/matchLabels/team"), Some(&json!("shop")));
        assert_eq!(object.pointer("/spec/template/metadata/labels/team"), Some(&json!("shop")));
        assert_eq!(object.pointer("/spec/template/metadata/labels/app"), Some(&json!("web")));
    }

    #[test]
    fn test_service_selector_labels() {
        let mut object = json!({"apiVersion": "v1", "kind": "Service", "metadata": {"name": "web"}});
        let labels = BTreeMap::from([("team".to_string(), "shop".to_string())]);
        add_labels(&mut object, &labels, true);
        assert_eq!(object.pointer("/spec/selector/team"), Some(&json!("shop")));
    }

    #[test]
    fn test_annotations_reach_pod_template() {
        let mut object = deployment();
        let annotations = BTreeMap::from([("owner".to_string(), "ops".to_string())]);
        add_annotations(&mut object, &annotations, true);
        assert_eq!(object.pointer("/metadata/annotations/owner"), Some(&json!("ops")));
        assert_eq!(
            object.pointer("/spec/template/metadata/annotations/owner"),
            Some(&json!("ops"))
        );
    }

    #[test]
    fn test_namespace_skips_cluster_scoped() {
        let mut resources = vec![
            deployment(),
            json!({"apiVersion": "v1", "kind": "Namespace", "metadata": {"name": "prod"}}),
            json!({"apiVersion": "v1", "kind": "ServiceAccount", "metadata": {"name": "runner"}}),
            json!({
                "apiVersion": "rbac.authorization.k8s.io/v1",
                "kind": "ClusterRoleBinding",
                "metadata": {"name": "runner"},
                "subjects": [
                    {"kind": "ServiceAccount", "name": "runner"},
                    {"kind": "ServiceAccount", "name": "other", "namespace": "kube-system"}
                ]
            }),
        ];
        set_namespace(&mut resources, "prod");

        assert_eq!(resource::namespace(&resources[0]), "prod");
        assert_eq!(resource::namespace(&resources[1]), "");
        assert_eq!(resource::namespace(&resources[3]), "");
        assert_eq!(resources[3].pointer("/subjects/0/namespace"), Some(&json!("prod")));
        assert_eq!(resources[3].pointer("/subjects/1/namespace"), Some(&json!("kube-system")));
    }

    #[test]
    fn test_affixes_update_references() {
        let mut resources = vec![
            deployment(),
            json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "settings"}}),
            json!({"apiVersion": "v1", "kind": "Secret", "metadata": {"name": "registry"}}),
            json!({"apiVersion": "v1", "kind": "ServiceAccount", "metadata": {"name": "runner"}}),
            json!({"apiVersion": "v1", "kind": "Namespace", "metadata": {"name": "prod"}}),
        ];
        add_name_affixes(&mut resources, "shop-", "-v1");

        assert_eq!(resource::name(&resources[0]), "shop-web-v1");
        assert_eq!(resource::name(&resources[4]), "prod");

        let pod = resources[0].pointer("/spec/template/spec").unwrap();
        assert_eq!(pod["serviceAccountName"], json!("shop-runner-v1"));
        assert_eq!(pod["imagePullSecrets"][0]["name"], json!("shop-registry-v1"));
        assert_eq!(pod["containers"][0]["envFrom"][0]["configMapRef"]["name"], json!("shop-settings-v1"));
        assert_eq!(pod["volumes"][0]["secret"]["secretName"], json!("shop-registry-v1"));
    }

    #[test]
    fn test_references_stay_within_namespace() {
        let mut resources = vec![{
            let mut d = deployment();
            resource::set_namespace(&mut d, "other");
            d
        }];
        rename_references(&mut resources, "ConfigMap", "prod", "settings", "settings-x");
        assert_eq!(
            resources[0].pointer("/spec/template/spec/containers/0/envFrom/0/configMapRef/name"),
            Some(&json!("settings"))
        );
    }

    #[test]
    fn test_split_image() {
        assert_eq!(split_image("nginx"), ("nginx", None, None));
        assert_eq!(split_image("nginx:1.25"), ("nginx", Some("1.25"), None));
        assert_eq!(
            split_image("registry.local:5000/team/nginx"),
            ("registry.local:5000/team/nginx", None, None)
        );
        assert_eq!(
            split_image("nginx@sha256:abc"),
            ("nginx", None, Some("sha256:abc"))
        );
    }

    #[test]
    fn test_set_images() {
        let mut object = deployment();
        let overrides = vec![ImageOverride {
            name: "registry.local:5000/team/nginx".to_string(),
            new_name: Some("mirror/nginx".to_string()),
            new_tag: Some("1.25".to_string()),
            digest: None,
        }];
        set_images(&mut object, &overrides);
        assert_eq!(
            object.pointer("/spec/template/spec/containers/0/image"),
            Some(&json!("mirror/nginx:1.25"))
        );
    }

    #[test]
    fn test_set_images_keeps_tag_when_only_renamed() {
        assert_eq!(
            override_image(
                "nginx:1.24",
                &[ImageOverride {
                    name: "nginx".to_string(),
                    new_name: Some("mirror/nginx".to_string()),
                    ..Default::default()
                }]
            ),
            Some("mirror/nginx:1.24".to_string())
        );
        assert_eq!(override_image("redis:7", &[]), None);
    }
}
