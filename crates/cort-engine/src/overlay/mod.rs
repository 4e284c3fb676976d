//! Overlay composition over a virtual file tree
//!
//! A kustomization-style overlay root lists resources (files or nested
//! overlay roots), generators, patches and built-in transformers. Composition
//! only reads from the supplied [`VirtualFs`]: there is no plugin loading and
//! no access to the real filesystem or network.
//!
//! Each kustomization is built in a fixed order:
//!
//! 1. resources, in listed order (nested roots are fully built first)
//! 2. `configMapGenerator` then `secretGenerator`
//! 3. `patchesStrategicMerge`, `patches`, `patchesJson6902`
//! 4. `namespace`, `namePrefix`/`nameSuffix`, `commonLabels`,
//!    `commonAnnotations`, `images`
//!
//! Content hash suffixes of generated objects are applied once, after the
//! root kustomization is built.

pub mod builtins;
pub mod generators;
pub mod kustomization;
pub mod patch;
pub mod resource;

use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::error::CompositionError;
use crate::vfs::VirtualFs;

use generators::GeneratedKind;
use kustomization::{Kustomization, PatchEntry, display_dir};
use patch::Patch;

/// Compose the overlay rooted at directory `root`
///
/// Returns the resulting objects as one multi-document YAML stream in
/// inclusion order. Any failure aborts the whole composition.
pub fn compose(fs: &VirtualFs, root: &str) -> Result<String, CompositionError> {
    let resources = compose_resources(fs, root)?;

    let mut out = String::new();
    for object in &resources {
        let document =
            serde_yaml::to_string(object).map_err(|e| CompositionError::InvalidResource {
                path: resource::describe(object),
                message: e.to_string(),
            })?;
        out.push_str("---\n");
        out.push_str(&document);
    }
    Ok(out)
}

/// Compose the overlay rooted at `root` into structured documents
pub fn compose_resources(fs: &VirtualFs, root: &str) -> Result<Vec<JsonValue>, CompositionError> {
    let root = crate::vfs::normalize_path(root)?;
    let mut stack = Vec::new();
    let mut resources = build(fs, &root, &mut stack)?;
    generators::apply_hash_suffixes(&mut resources)?;

    tracing::debug!(
        root = %display_dir(&root),
        resources = resources.len(),
        "composed overlay"
    );
    Ok(resources)
}

/// Build one kustomization; `stack` holds the roots currently being built
fn build(
    fs: &VirtualFs,
    dir: &str,
    stack: &mut Vec<String>,
) -> Result<Vec<JsonValue>, CompositionError> {
    if stack.iter().any(|d| d == dir) {
        return Err(CompositionError::Cycle {
            path: display_dir(dir),
        });
    }
    stack.push(dir.to_string());

    let kustomization = kustomization::load(fs, dir)?;
    let mut resources = Vec::new();

    for entry in &kustomization.resources {
        let path = VirtualFs::join(dir, entry)?;
        if fs.is_file(&path) {
            resources.extend(read_resources(fs, &path)?);
        } else if fs.is_dir(&path) {
            resources.extend(build(fs, &path, stack)?);
        } else {
            return Err(CompositionError::ResourceNotFound { path });
        }
    }

    run_generators(fs, dir, &kustomization, &mut resources)?;
    run_patches(fs, dir, &kustomization, &mut resources)?;
    run_transformers(&kustomization, &mut resources);

    tracing::trace!(dir = %display_dir(dir), resources = resources.len(), "built kustomization");

    stack.pop();
    Ok(resources)
}

/// Decode a resource file; empty documents are skipped
fn read_resources(fs: &VirtualFs, path: &str) -> Result<Vec<JsonValue>, CompositionError> {
    let text = fs.read_to_string(path)?;
    let invalid = |message: String| CompositionError::InvalidResource {
        path: path.to_string(),
        message,
    };

    let mut resources = Vec::new();
    for (index, document) in serde_yaml::Deserializer::from_str(&text).enumerate() {
        let value = JsonValue::deserialize(document)
            .map_err(|e| invalid(format!("document {}: {}", index, e)))?;
        match value {
            JsonValue::Null => {}
            JsonValue::Object(_) => {
                if resource::kind(&value).is_empty() || resource::name(&value).is_empty() {
                    return Err(invalid(format!("document {}: missing kind or metadata.name", index)));
                }
                resources.push(value);
            }
            _ => return Err(invalid(format!("document {}: not a mapping", index))),
        }
    }
    Ok(resources)
}

fn run_generators(
    fs: &VirtualFs,
    dir: &str,
    kustomization: &Kustomization,
    resources: &mut Vec<JsonValue>,
) -> Result<(), CompositionError> {
    let global = &kustomization.generator_options;
    for args in &kustomization.config_map_generator {
        generators::generate(fs, dir, GeneratedKind::ConfigMap, args, global, resources)?;
    }
    for args in &kustomization.secret_generator {
        generators::generate(fs, dir, GeneratedKind::Secret, args, global, resources)?;
    }
    Ok(())
}

/// Patch text and a label for messages
fn patch_source(
    fs: &VirtualFs,
    dir: &str,
    entry: &PatchEntry,
) -> Result<(String, String), CompositionError> {
    match (&entry.path, &entry.patch) {
        (Some(path), None) => {
            let path = VirtualFs::join(dir, path)?;
            let text = fs.read_to_string(&path).map_err(|_| CompositionError::ResourceNotFound {
                path: path.clone(),
            })?;
            Ok((text, path))
        }
        (None, Some(inline)) => Ok((inline.clone(), format!("inline patch in {}", display_dir(dir)))),
        _ => Err(CompositionError::InvalidPatch {
            patch: display_dir(dir),
            message: "exactly one of path or patch must be set".to_string(),
        }),
    }
}

fn run_patches(
    fs: &VirtualFs,
    dir: &str,
    kustomization: &Kustomization,
    resources: &mut Vec<JsonValue>,
) -> Result<(), CompositionError> {
    for entry in &kustomization.patches_strategic_merge {
        // Either a file path or inline YAML
        let (text, label) = match VirtualFs::join(dir, entry) {
            Ok(path) if fs.is_file(&path) => (fs.read_to_string(&path)?, path),
            _ if entry.contains('\n') || entry.contains(':') => {
                (entry.clone(), format!("inline patch in {}", display_dir(dir)))
            }
            _ => {
                return Err(CompositionError::ResourceNotFound {
                    path: entry.clone(),
                });
            }
        };
        let patch = Patch::parse(&text, &label)?;
        if !matches!(patch, Patch::StrategicMerge(_)) {
            return Err(CompositionError::InvalidPatch {
                patch: label,
                message: "expected a strategic merge patch".to_string(),
            });
        }
        patch::apply(resources, &patch, None, &label)?;
    }

    for entry in &kustomization.patches {
        let (text, label) = patch_source(fs, dir, entry)?;
        let patch = Patch::parse(&text, &label)?;
        patch::apply(resources, &patch, entry.target.as_ref(), &label)?;
    }

    for entry in &kustomization.patches_json6902 {
        let (text, label) = patch_source(fs, dir, entry)?;
        let patch = Patch::parse(&text, &label)?;
        if !matches!(patch, Patch::Json6902(_)) {
            return Err(CompositionError::InvalidPatch {
                patch: label,
                message: "expected a list of JSON6902 operations".to_string(),
            });
        }
        patch::apply(resources, &patch, entry.target.as_ref(), &label)?;
    }

    Ok(())
}

fn run_transformers(kustomization: &Kustomization, resources: &mut [JsonValue]) {
    if let Some(namespace) = kustomization.namespace.as_deref().filter(|ns| !ns.is_empty()) {
        builtins::set_namespace(resources, namespace);
    }

    builtins::add_name_affixes(
        resources,
        kustomization.name_prefix.as_deref().unwrap_or_default(),
        kustomization.name_suffix.as_deref().unwrap_or_default(),
    );

    for object in resources.iter_mut() {
        builtins::add_labels(object, &kustomization.common_labels, true);
        builtins::add_annotations(object, &kustomization.common_annotations, true);
        builtins::set_images(object, &kustomization.images);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> VirtualFs {
        let mut fs = VirtualFs::new();
        fs.write(
            "base/kustomization.yaml",
            "resources:\n  - deployment.yaml\n  - service.yaml\n",
        )
        .unwrap();
        fs.write(
            "base/deployment.yaml",
            r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  replicas: 1
  selector:
    matchLabels:
      app: web
  template:
    metadata:
      labels:
        app: web
    spec:
      containers:
        - name: app
          image: nginx:1.24
          envFrom:
            - configMapRef:
                name: settings
"#,
        )
        .unwrap();
        fs.write(
            "base/service.yaml",
            "apiVersion: v1\nkind: Service\nmetadata:\n  name: web\nspec:\n  selector:\n    app: web\n",
        )
        .unwrap();
        fs
    }

    #[test]
    fn test_compose_plain_resources_in_order() {
        let fs = base();
        let resources = compose_resources(&fs, "base").unwrap();
        let kinds: Vec<_> = resources.iter().map(resource::kind).collect();
        assert_eq!(kinds, vec!["Deployment", "Service"]);
    }

    #[test]
    fn test_compose_overlay() {
        let mut fs = base();
        fs.write(
            "kustomization.yaml",
            r#"
resources:
  - base
namespace: prod
namePrefix: shop-
commonLabels:
  team: shop
images:
  - name: nginx
    newTag: "1.25"
configMapGenerator:
  - name: settings
    literals:
      - color=blue
patches:
  - patch: |
      apiVersion: apps/v1
      kind: Deployment
      metadata:
        name: web
      spec:
        replicas: 3
"#,
        )
        .unwrap();

        let resources = compose_resources(&fs, "").unwrap();
        assert_eq!(resources.len(), 3);

        let deployment = &resources[0];
        assert_eq!(resource::name(deployment), "shop-web");
        assert_eq!(resource::namespace(deployment), "prod");
        assert_eq!(deployment.pointer("/spec/replicas"), Some(&json!(3)));
        assert_eq!(deployment.pointer("/spec/selector/matchLabels/team"), Some(&json!("shop")));
        assert_eq!(
            deployment.pointer("/spec/template/spec/containers/0/image"),
            Some(&json!("nginx:1.25"))
        );

        let config_map = &resources[2];
        let cm_name = resource::name(config_map);
        assert!(cm_name.starts_with("shop-settings-"));
        assert_eq!(
            deployment.pointer("/spec/template/spec/containers/0/envFrom/0/configMapRef/name"),
            Some(&json!(cm_name))
        );
        assert_eq!(config_map.pointer("/metadata/labels/team"), Some(&json!("shop")));
    }

    #[test]
    fn test_compose_output_is_multi_document() {
        let fs = base();
        let out = compose(&fs, "base").unwrap();
        assert_eq!(out.matches("---\n").count(), 2);

        let objects = cort_core::decode_documents(&out).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[1].key().kind, "Service");
    }

    #[test]
    fn test_compose_is_deterministic() {
        let mut fs = base();
        fs.write(
            "kustomization.yaml",
            "resources: [base]\nconfigMapGenerator:\n  - name: settings\n    literals: [a=1]\n",
        )
        .unwrap();
        assert_eq!(compose(&fs, "").unwrap(), compose(&fs, "").unwrap());
    }

    #[test]
    fn test_missing_root() {
        let fs = base();
        assert!(matches!(compose(&fs, ""), Err(CompositionError::RootNotFound { .. })));
    }

    #[test]
    fn test_missing_resource() {
        let mut fs = VirtualFs::new();
        fs.write("kustomization.yaml", "resources: [nope.yaml]\n").unwrap();
        let err = compose(&fs, "").unwrap_err();
        assert!(matches!(err, CompositionError::ResourceNotFound { ref path } if path == "nope.yaml"));
    }

    #[test]
    fn test_cycle_detection() {
        let mut fs = VirtualFs::new();
        fs.write("a/kustomization.yaml", "resources: [../b]\n").unwrap();
        fs.write("b/kustomization.yaml", "resources: [../a]\n").unwrap();
        let err = compose(&fs, "a").unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"kustomization cycle detected at 'a'");
    }

    #[test]
    fn test_resource_cannot_escape_root() {
        let mut fs = VirtualFs::new();
        fs.write("kustomization.yaml", "resources: [../outside.yaml]\n").unwrap();
        let err = compose(&fs, "").unwrap_err();
        assert!(matches!(err, CompositionError::Fs(_)));
    }

    #[test]
    fn test_patch_target_missing() {
        let mut fs = base();
        fs.write(
            "kustomization.yaml",
            r#"
resources: [base]
patches:
  - target:
      kind: StatefulSet
    patch: |
      - op: replace
        path: /spec/replicas
        value: 2
"#,
        )
        .unwrap();
        assert!(matches!(
            compose(&fs, ""),
            Err(CompositionError::PatchTargetNotFound { .. })
        ));
    }

    #[test]
    fn test_patches_strategic_merge_file() {
        let mut fs = base();
        fs.write(
            "kustomization.yaml",
            "resources: [base]\npatchesStrategicMerge:\n  - replicas.yaml\n",
        )
        .unwrap();
        fs.write(
            "replicas.yaml",
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\nspec:\n  replicas: 4\n",
        )
        .unwrap();

        let resources = compose_resources(&fs, "").unwrap();
        assert_eq!(resources[0].pointer("/spec/replicas"), Some(&json!(4)));
    }

    #[test]
    fn test_invalid_resource_document() {
        let mut fs = VirtualFs::new();
        fs.write("kustomization.yaml", "resources: [list.yaml]\n").unwrap();
        fs.write("list.yaml", "- a\n- b\n").unwrap();
        assert!(matches!(
            compose(&fs, ""),
            Err(CompositionError::InvalidResource { .. })
        ));
    }
}
