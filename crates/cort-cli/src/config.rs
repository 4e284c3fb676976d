//! Source directory configuration
//!
//! Read from `cort.yaml` at the top of the source directory, or from the
//! file given with `--config`.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::Path;

use cort_core::DecodedObject;
use cort_engine::{SourceTree, StaticObjectStore, TemplateSet, VirtualFs};

use crate::error::{CliError, Result};

pub const CONFIG_FILE: &str = "cort.yaml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct CortConfig {
    /// Only files ending with this suffix are templates; empty renders every file
    pub template_suffix: String,

    /// Render templates strictly and skip overlay composition
    pub strict: bool,

    /// Deployment namespace used when `--namespace` is not given
    pub namespace: Option<String>,

    /// Deployment name used when `--name` is not given
    pub name: Option<String>,

    /// Objects served to template lookups
    pub lookup_objects: Vec<JsonValue>,
}

impl CortConfig {
    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CliError::io(format!("failed to read {}", path.display()), e))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content).map_err(|e| {
            CliError::input_with_help(
                format!("invalid configuration {}: {}", path.display(), e),
                "known fields are templateSuffix, strict, namespace, name and lookupObjects",
            )
        })
    }

    /// Explicit file if given, else `cort.yaml` in `dir` if present, else defaults
    pub fn discover(dir: &Path, explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        let path = dir.join(CONFIG_FILE);
        if path.is_file() {
            tracing::debug!(path = %path.display(), "loading configuration");
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Object store over `lookupObjects`; `None` when there are none
    pub fn object_store(&self) -> Result<Option<StaticObjectStore>> {
        if self.lookup_objects.is_empty() {
            return Ok(None);
        }
        let objects = self
            .lookup_objects
            .iter()
            .cloned()
            .map(DecodedObject::from_value)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| CliError::input(format!("invalid lookup object: {}", e)))?;
        Ok(Some(StaticObjectStore::from_objects(objects)))
    }
}

/// Drop the configuration file from a loaded source tree
pub fn strip_config(tree: SourceTree, suffix: &str) -> Result<SourceTree> {
    // a suffix of `.yaml` loads the file as template `cort`
    let template_name = CONFIG_FILE.strip_suffix(suffix).filter(|_| !suffix.is_empty());

    let mut templates = TemplateSet::new();
    for (name, source) in tree.templates.iter() {
        if name != CONFIG_FILE && Some(name) != template_name {
            templates.add(name, source);
        }
    }

    let mut statics = VirtualFs::new();
    for (path, content) in tree.statics.files() {
        if path != CONFIG_FILE {
            statics
                .write(path, content)
                .map_err(|e| CliError::Other {
                    message: e.to_string(),
                })?;
        }
    }

    Ok(SourceTree { templates, statics })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() {
        let dir = TempDir::new().unwrap();
        let config = CortConfig::discover(dir.path(), None).unwrap();
        assert_eq!(config, CortConfig::default());
        assert!(config.object_store().unwrap().is_none());
    }

    #[test]
    fn test_load_from_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"
templateSuffix: .j2
strict: true
namespace: apps
lookupObjects:
  - apiVersion: v1
    kind: ConfigMap
    metadata:
      name: settings
      namespace: apps
    data:
      color: blue
"#,
        )
        .unwrap();

        let config = CortConfig::discover(dir.path(), None).unwrap();
        assert_eq!(config.template_suffix, ".j2");
        assert!(config.strict);
        assert_eq!(config.namespace.as_deref(), Some("apps"));
        assert_eq!(config.name, None);
        assert_eq!(config.object_store().unwrap().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.yaml");
        std::fs::write(&path, "strcit: true\n").unwrap();

        let err = CortConfig::discover(dir.path(), Some(&path)).unwrap_err();
        assert!(matches!(err, CliError::Input { .. }));
    }

    #[test]
    fn test_strip_config() {
        let mut statics = VirtualFs::new();
        statics.write("kustomization.yaml", "resources: []").unwrap();
        statics.write(CONFIG_FILE, "strict: false").unwrap();
        let tree = SourceTree {
            templates: TemplateSet::new()
                .with("cm.yaml", "kind: ConfigMap")
                .with(CONFIG_FILE, "strict: true"),
            statics,
        };

        let stripped = strip_config(tree, "").unwrap();
        assert_eq!(stripped.templates.names(), vec!["cm.yaml"]);
        assert!(stripped.statics.exists("kustomization.yaml"));
        assert!(!stripped.statics.exists(CONFIG_FILE));
    }
}
