//! Components: the custom resources whose dependent objects are managed

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::Result;
use crate::parameters::Parameters;
use crate::status::ComponentStatus;

/// Deployment target overrides carried in a component spec
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    /// Namespace the dependent objects are deployed to
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    /// Name used for the deployment
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

/// Fill empty deployment target fields from the component's own metadata
///
/// Hosts call this from their defaulting hook after reading a component.
pub fn default_deployment_target(spec: &mut ComponentSpec, namespace: &str, name: &str) {
    if spec.namespace.is_empty() {
        spec.namespace = namespace.to_string();
    }
    if spec.name.is_empty() {
        spec.name = name.to_string();
    }
}

/// A component as seen by the reconciliation pass
pub trait Component {
    fn metadata_namespace(&self) -> &str;

    fn metadata_name(&self) -> &str;

    /// Generation of the component spec
    fn generation(&self) -> i64;

    /// The component has been marked for deletion
    fn is_deleting(&self) -> bool;

    /// Deployment target overrides, for components that carry them
    fn component_spec(&self) -> Option<&ComponentSpec> {
        None
    }

    /// Template input derived from the spec
    fn parameters(&self) -> Result<Parameters>;

    fn status(&self) -> &ComponentStatus;

    fn status_mut(&mut self) -> &mut ComponentStatus;

    fn deployment_namespace(&self) -> &str {
        match self.component_spec() {
            Some(spec) if !spec.namespace.is_empty() => &spec.namespace,
            _ => self.metadata_namespace(),
        }
    }

    fn deployment_name(&self) -> &str {
        match self.component_spec() {
            Some(spec) if !spec.name.is_empty() => &spec.name,
            _ => self.metadata_name(),
        }
    }
}

/// Object metadata of a component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    pub name: String,

    #[serde(default)]
    pub generation: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

/// Spec of a [`ComponentResource`]: target overrides plus free-form values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    #[serde(flatten)]
    pub target: ComponentSpec,

    #[serde(flatten)]
    pub values: serde_json::Map<String, JsonValue>,
}

/// A generic component document
///
/// ```yaml
/// metadata:
///   namespace: team-a
///   name: shop
///   generation: 3
/// spec:
///   namespace: shop-prod
///   replicas: 2
/// status: {}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentResource {
    pub metadata: ComponentMeta,

    #[serde(default)]
    pub spec: ResourceSpec,

    #[serde(default)]
    pub status: ComponentStatus,
}

impl ComponentResource {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            metadata: ComponentMeta {
                namespace: namespace.into(),
                name: name.into(),
                generation: 1,
                deletion_timestamp: None,
            },
            spec: ResourceSpec::default(),
            status: ComponentStatus::default(),
        }
    }

    /// Parse a component from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Replace the free-form spec values with the given parameters
    pub fn with_values(mut self, parameters: &Parameters) -> Self {
        self.spec.values = parameters.as_mapping().cloned().unwrap_or_default();
        self
    }

    pub fn apply_defaults(&mut self) {
        default_deployment_target(
            &mut self.spec.target,
            &self.metadata.namespace,
            &self.metadata.name,
        );
    }
}

impl Component for ComponentResource {
    fn metadata_namespace(&self) -> &str {
        &self.metadata.namespace
    }

    fn metadata_name(&self) -> &str {
        &self.metadata.name
    }

    fn generation(&self) -> i64 {
        self.metadata.generation
    }

    fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    fn component_spec(&self) -> Option<&ComponentSpec> {
        Some(&self.spec.target)
    }

    fn parameters(&self) -> Result<Parameters> {
        Parameters::from_serialize(&self.spec)
    }

    fn status(&self) -> &ComponentStatus {
        &self.status
    }

    fn status_mut(&mut self) -> &mut ComponentStatus {
        &mut self.status
    }
}
