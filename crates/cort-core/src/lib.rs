//! Cort Core - Core types for the component operator runtime
//!
//! This crate provides the data model shared by the generation pipeline and
//! the inventory reconciler:
//! - `Parameters`: Structured template input derived from a component spec
//! - `DecodedObject`: A rendered dependent object with its identity
//! - `InventoryItem`: Persisted lifecycle record of a dependent object
//! - `ComponentStatus`: Generations, conditions, state and inventory
//! - `digest`: Canonical content hashing of object bodies

pub mod component;
pub mod digest;
pub mod error;
pub mod inventory;
pub mod object;
pub mod parameters;
pub mod status;

pub use component::{
    Component, ComponentMeta, ComponentResource, ComponentSpec, ResourceSpec, default_deployment_target,
};
pub use digest::{canonicalize, digest, digest_object};
pub use error::{CoreError, Result};
pub use inventory::{
    InventoryItem, NameInfo, ObjectStatus, Phase, PhaseEvent, TypeInfo, managed_types_of,
};
pub use object::{DecodedObject, ObjectKey, decode_documents, ensure_unique, to_documents};
pub use parameters::{Parameters, parse_set_values};
pub use status::{ComponentStatus, Condition, ConditionStatus, ConditionType, State};
