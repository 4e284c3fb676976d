//! Kustomization file model

use serde::Deserialize;
use std::collections::BTreeMap;

use crate::error::CompositionError;
use crate::vfs::VirtualFs;

/// File names that mark a directory as an overlay root, in lookup order
pub const KUSTOMIZATION_FILES: &[&str] = &["kustomization.yaml", "kustomization.yml", "Kustomization"];

/// A parsed kustomization file
///
/// Unknown fields are rejected so that unsupported features fail loudly
/// instead of being silently ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct Kustomization {
    pub api_version: Option<String>,
    pub kind: Option<String>,
    pub resources: Vec<String>,
    pub namespace: Option<String>,
    pub name_prefix: Option<String>,
    pub name_suffix: Option<String>,
    pub common_labels: BTreeMap<String, String>,
    pub common_annotations: BTreeMap<String, String>,
    pub images: Vec<ImageOverride>,
    pub patches: Vec<PatchEntry>,
    pub patches_strategic_merge: Vec<String>,
    #[serde(rename = "patchesJson6902")]
    pub patches_json6902: Vec<PatchEntry>,
    pub config_map_generator: Vec<GeneratorArgs>,
    pub secret_generator: Vec<GeneratorArgs>,
    pub generator_options: GeneratorOptions,
}

/// Entry of `images`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageOverride {
    pub name: String,
    pub new_name: Option<String>,
    pub new_tag: Option<String>,
    pub digest: Option<String>,
}

/// Entry of `patches` or `patchesJson6902`: a file path or inline patch text
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PatchEntry {
    pub path: Option<String>,
    pub patch: Option<String>,
    pub target: Option<PatchTarget>,
}

/// Selector for the objects a patch applies to
///
/// Empty fields match anything. `labelSelector` supports comma separated
/// `key=value` terms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PatchTarget {
    pub group: Option<String>,
    pub version: Option<String>,
    pub kind: Option<String>,
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub label_selector: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorBehavior {
    #[default]
    Create,
    Merge,
    Replace,
}

/// Entry of `configMapGenerator` or `secretGenerator`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeneratorArgs {
    pub name: String,
    pub namespace: Option<String>,
    pub behavior: GeneratorBehavior,
    pub literals: Vec<String>,
    pub files: Vec<String>,
    pub envs: Vec<String>,
    /// Secret type, `Opaque` when unset; ignored for ConfigMaps
    #[serde(rename = "type")]
    pub secret_type: Option<String>,
    pub options: Option<GeneratorOptions>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeneratorOptions {
    pub disable_name_suffix_hash: bool,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

impl GeneratorOptions {
    /// Per-generator options layered over the global ones
    pub fn overlay(&self, local: Option<&GeneratorOptions>) -> GeneratorOptions {
        let mut merged = self.clone();
        if let Some(local) = local {
            merged.disable_name_suffix_hash |= local.disable_name_suffix_hash;
            merged.labels.extend(local.labels.clone());
            merged.annotations.extend(local.annotations.clone());
        }
        merged
    }
}

/// Path of the kustomization file in `dir`, if any
pub fn find_kustomization(fs: &VirtualFs, dir: &str) -> Option<String> {
    KUSTOMIZATION_FILES.iter().find_map(|file| {
        VirtualFs::join(dir, file)
            .ok()
            .filter(|path| fs.is_file(path))
    })
}

/// Load and parse the kustomization file of `dir`
pub fn load(fs: &VirtualFs, dir: &str) -> Result<Kustomization, CompositionError> {
    let path = find_kustomization(fs, dir).ok_or_else(|| CompositionError::RootNotFound {
        path: display_dir(dir),
    })?;

    let text = fs.read_to_string(&path)?;
    if text.trim().is_empty() {
        return Ok(Kustomization::default());
    }

    let kustomization: Kustomization =
        serde_yaml::from_str(&text).map_err(|e| CompositionError::InvalidKustomization {
            path: path.clone(),
            message: e.to_string(),
        })?;

    if let Some(kind) = &kustomization.kind
        && kind != "Kustomization"
    {
        return Err(CompositionError::InvalidKustomization {
            path,
            message: format!("unsupported kind '{}'", kind),
        });
    }

    Ok(kustomization)
}

/// Directory name for messages, `.` for the root
pub fn display_dir(dir: &str) -> String {
    if dir.is_empty() { ".".to_string() } else { dir.to_string() }
}
