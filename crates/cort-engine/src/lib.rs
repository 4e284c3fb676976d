//! Cort Engine - Manifest generation pipeline
//!
//! This crate turns component parameters into dependent objects:
//! - MiniJinja template rendering with Kubernetes-oriented filters
//! - Read-only object lookups bound to an explicit object store
//! - Kustomization-style overlay composition over an in-memory tree
//! - Parameter and object transformer chains around any generator
//! - Human-readable template errors with suggestions

pub mod engine;
pub mod error;
pub mod filters;
pub mod functions;
pub mod generator;
pub mod lookup;
pub mod overlay;
pub mod suggestions;
pub mod transformer;
pub mod vfs;

pub use engine::{Engine, EngineBuilder, RenderContext, RenderedArtifact, TemplateSet};
pub use error::{
    BoxError, CompositionError, EngineError, LookupError, Result, TemplateError,
    TemplateErrorKind, TransformError, TransformStage, VfsError,
};
pub use generator::{Generator, KustomizeGenerator, TemplateGenerator, TransformableGenerator};
pub use lookup::{ObjectStore, StaticObjectStore};
pub use suggestions::{AVAILABLE_FILTERS, AVAILABLE_FUNCTIONS};
pub use transformer::{DefaultNamespace, ObjectTransformer, ParameterTransformer};
pub use vfs::{SourceTree, VirtualFs, load_dir};
