//! Inventory of dependent objects and their lifecycle phases
//!
//! Every dependent object a component has ever applied is tracked by an
//! [`InventoryItem`] until its deletion has been confirmed. Phases move along
//!
//! ```text
//! ScheduledForApplication -> Creating | Updating -> Ready
//! Ready -> ScheduledForDeletion -> Deleting -> Completed
//! Deleting -> ScheduledForCompletion -> Completing -> Completed   (managed types)
//! ```
//!
//! The reconciler schedules work; the external applier reports progress with
//! [`PhaseEvent`]s through [`InventoryItem::advance`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};
use crate::object::{DecodedObject, ObjectKey};

/// A Kubernetes type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeInfo {
    /// API group
    pub group: String,
    /// API group version ("*" matches every version)
    pub version: String,
    /// API kind ("*" matches every kind)
    pub kind: String,
}

impl TypeInfo {
    pub fn new(group: impl Into<String>, version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }

    /// The apiVersion string for this type
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.kind)
    }
}

/// Namespace and name of an object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NameInfo {
    /// Namespace; empty for cluster-scoped objects
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Name
    pub name: String,
}

/// Lifecycle phase of an inventory item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    ScheduledForApplication,
    Creating,
    Updating,
    Ready,
    ScheduledForDeletion,
    Deleting,
    ScheduledForCompletion,
    Completing,
    Completed,
}

impl Phase {
    /// The object is currently desired
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Phase::ScheduledForApplication | Phase::Creating | Phase::Updating | Phase::Ready
        )
    }

    /// The object is being removed
    pub fn is_removal(self) -> bool {
        matches!(self, Phase::ScheduledForDeletion | Phase::Deleting)
    }

    /// The object is gone and its managed types are being drained
    pub fn is_completion(self) -> bool {
        matches!(self, Phase::ScheduledForCompletion | Phase::Completing)
    }

    pub fn is_terminal(self) -> bool {
        self == Phase::Completed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::ScheduledForApplication => "ScheduledForApplication",
            Phase::Creating => "Creating",
            Phase::Updating => "Updating",
            Phase::Ready => "Ready",
            Phase::ScheduledForDeletion => "ScheduledForDeletion",
            Phase::Deleting => "Deleting",
            Phase::ScheduledForCompletion => "ScheduledForCompletion",
            Phase::Completing => "Completing",
            Phase::Completed => "Completed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observed readiness of a dependent object (kstatus classification)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectStatus {
    InProgress,
    Current,
    Failed,
    Terminating,
    NotFound,
    #[serde(other)]
    Unknown,
}

impl ObjectStatus {
    pub fn is_failure(self) -> bool {
        self == ObjectStatus::Failed
    }
}

/// Progress reported by the external applier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    /// An apply call was issued; `created` when the object did not exist
    ApplyStarted { created: bool },
    /// The applied object reached its desired state
    ApplyConfirmed,
    /// A delete call was issued
    DeleteStarted,
    /// The object no longer exists
    DeleteConfirmed,
    /// Draining of objects of the managed types has begun
    CompletionStarted,
    /// No objects of the managed types are left
    CompletionConfirmed,
}

impl fmt::Display for PhaseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseEvent::ApplyStarted { created: true } => f.write_str("ApplyStarted(create)"),
            PhaseEvent::ApplyStarted { created: false } => f.write_str("ApplyStarted(update)"),
            PhaseEvent::ApplyConfirmed => f.write_str("ApplyConfirmed"),
            PhaseEvent::DeleteStarted => f.write_str("DeleteStarted"),
            PhaseEvent::DeleteConfirmed => f.write_str("DeleteConfirmed"),
            PhaseEvent::CompletionStarted => f.write_str("CompletionStarted"),
            PhaseEvent::CompletionConfirmed => f.write_str("CompletionConfirmed"),
        }
    }
}

/// A dependent object managed on behalf of a component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    /// Type of the dependent object
    #[serde(flatten)]
    pub type_info: TypeInfo,

    /// Namespace and name of the dependent object
    #[serde(flatten)]
    pub name_info: NameInfo,

    /// Types whose objects this object fans out to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub managed_types: Vec<TypeInfo>,

    /// Digest of the last scheduled body
    pub digest: String,

    /// Lifecycle phase
    pub phase: Phase,

    /// Observed status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ObjectStatus>,
}

impl InventoryItem {
    /// New item for an object that appeared for the first time
    pub fn scheduled(object: &DecodedObject, digest: String) -> Self {
        let key = object.key();
        Self {
            type_info: key.type_info(),
            name_info: key.name_info(),
            managed_types: managed_types_of(object),
            digest,
            phase: Phase::ScheduledForApplication,
            status: None,
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::from_parts(&self.type_info, &self.name_info)
    }

    pub fn matches(&self, key: &ObjectKey) -> bool {
        self.type_info.group == key.group
            && self.type_info.version == key.version
            && self.type_info.kind == key.kind
            && self.name_info.namespace == key.namespace
            && self.name_info.name == key.name
    }

    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Ready
    }

    /// Record the externally observed status
    pub fn record_status(&mut self, status: ObjectStatus) {
        self.status = Some(status);
    }

    /// Apply a progress event from the applier
    ///
    /// Removal and completion phases never lead back to an active phase; an
    /// object that is desired again is re-created as a new item once this one
    /// has been purged.
    pub fn advance(&mut self, event: PhaseEvent) -> Result<Phase> {
        use Phase::*;

        let next = match (self.phase, event) {
            (ScheduledForApplication | Creating | Updating | Ready, PhaseEvent::ApplyStarted { created }) => {
                if created { Creating } else { Updating }
            }
            (Creating | Updating | Ready, PhaseEvent::ApplyConfirmed) => Ready,
            (ScheduledForDeletion | Deleting, PhaseEvent::DeleteStarted) => Deleting,
            (ScheduledForDeletion | Deleting, PhaseEvent::DeleteConfirmed) => {
                if self.managed_types.is_empty() {
                    Completed
                } else {
                    ScheduledForCompletion
                }
            }
            (ScheduledForCompletion | Completing, PhaseEvent::CompletionStarted) => Completing,
            (ScheduledForCompletion | Completing, PhaseEvent::CompletionConfirmed) => Completed,
            (from, event) => {
                return Err(CoreError::InvalidTransition {
                    key: self.key().to_string(),
                    from,
                    event: event.to_string(),
                });
            }
        };

        self.phase = next;
        Ok(next)
    }
}

/// Types an object fans out to
///
/// A CustomResourceDefinition manages every version of the kind it defines;
/// an APIService manages every kind served by its group version.
pub fn managed_types_of(object: &DecodedObject) -> Vec<TypeInfo> {
    let key = object.key();
    let body = object.body();
    let field = |pointer: &str| body.pointer(pointer).and_then(|v| v.as_str());

    match (key.group.as_str(), key.kind.as_str()) {
        ("apiextensions.k8s.io", "CustomResourceDefinition") => {
            match (field("/spec/group"), field("/spec/names/kind")) {
                (Some(group), Some(kind)) => vec![TypeInfo::new(group, "*", kind)],
                _ => Vec::new(),
            }
        }
        ("apiregistration.k8s.io", "APIService") => {
            match (field("/spec/group"), field("/spec/version")) {
                (Some(group), Some(version)) => vec![TypeInfo::new(group, version, "*")],
                _ => Vec::new(),
            }
        }
        _ => Vec::new(),
    }
}
