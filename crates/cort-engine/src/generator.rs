//! Generators: parameters in, ordered dependent objects out

use std::path::Path;
use std::sync::Arc;

use cort_core::{DecodedObject, Parameters, decode_documents, ensure_unique};

use crate::engine::{Engine, EngineBuilder, RenderContext, RenderedArtifact};
use crate::error::{Result, TransformError, TransformStage};
use crate::lookup::ObjectStore;
use crate::overlay;
use crate::transformer::{ObjectTransformer, ParameterTransformer};
use crate::vfs::{self, SourceTree};

/// Produces the desired dependent objects of a component
pub trait Generator: Send + Sync {
    /// Generate the ordered object list for one pass
    ///
    /// Any failure aborts the pass; there is no partial output.
    fn generate(
        &self,
        namespace: &str,
        name: &str,
        parameters: &Parameters,
    ) -> Result<Vec<DecodedObject>>;
}

impl<G: Generator + ?Sized> Generator for Arc<G> {
    fn generate(
        &self,
        namespace: &str,
        name: &str,
        parameters: &Parameters,
    ) -> Result<Vec<DecodedObject>> {
        (**self).generate(namespace, name, parameters)
    }
}

fn engine(strict: bool, client: Option<Arc<dyn ObjectStore>>) -> Engine {
    let builder = EngineBuilder::new().strict(strict);
    match client {
        Some(client) => builder.with_client(client),
        None => builder,
    }
    .build()
}

/// Renders templates leniently into a virtual tree and composes the overlay
/// rooted at its top directory
#[derive(Clone)]
pub struct KustomizeGenerator {
    sources: SourceTree,
    engine: Engine,
}

impl KustomizeGenerator {
    pub fn new(sources: SourceTree, client: Option<Arc<dyn ObjectStore>>) -> Self {
        Self {
            sources,
            engine: engine(false, client),
        }
    }

    /// Load templates and static files from a directory
    ///
    /// This is the only point where the real filesystem is read.
    pub fn from_dir(
        path: impl AsRef<Path>,
        template_suffix: &str,
        client: Option<Arc<dyn ObjectStore>>,
    ) -> Result<Self> {
        let sources = vfs::load_dir(path.as_ref(), template_suffix)?;
        Ok(Self::new(sources, client))
    }

    /// Wrap into a transformable generator with a parameter transformer attached
    pub fn with_parameter_transformer(
        self,
        transformer: impl ParameterTransformer + 'static,
    ) -> TransformableGenerator {
        TransformableGenerator::new(self).with_parameter_transformer(transformer)
    }

    /// Wrap into a transformable generator with an object transformer attached
    pub fn with_object_transformer(
        self,
        transformer: impl ObjectTransformer + 'static,
    ) -> TransformableGenerator {
        TransformableGenerator::new(self).with_object_transformer(transformer)
    }

    pub fn sources(&self) -> &SourceTree {
        &self.sources
    }
}

impl Generator for KustomizeGenerator {
    fn generate(
        &self,
        namespace: &str,
        name: &str,
        parameters: &Parameters,
    ) -> Result<Vec<DecodedObject>> {
        let ctx = RenderContext::new(namespace, name, parameters);
        let artifacts = self.engine.render_all(&self.sources.templates, &ctx)?;

        let mut fs = self.sources.statics.clone();
        for RenderedArtifact { path, content } in artifacts {
            fs.write(&path, content)?;
        }

        let composed = overlay::compose(&fs, "")?;
        let objects = decode_documents(&composed)?;
        ensure_unique(&objects)?;

        tracing::debug!(namespace, name, objects = objects.len(), "generated objects from overlay");
        Ok(objects)
    }
}

/// Renders every template strictly and decodes the output directly
///
/// Templates whose file name starts with `_` only provide includes and
/// produce no output.
#[derive(Clone)]
pub struct TemplateGenerator {
    sources: SourceTree,
    engine: Engine,
}

impl TemplateGenerator {
    pub fn new(sources: SourceTree, client: Option<Arc<dyn ObjectStore>>) -> Self {
        Self {
            sources,
            engine: engine(true, client),
        }
    }

    pub fn from_dir(
        path: impl AsRef<Path>,
        template_suffix: &str,
        client: Option<Arc<dyn ObjectStore>>,
    ) -> Result<Self> {
        let sources = vfs::load_dir(path.as_ref(), template_suffix)?;
        Ok(Self::new(sources, client))
    }
}

fn is_partial(path: &str) -> bool {
    path.rsplit('/').next().is_some_and(|file| file.starts_with('_'))
}

impl Generator for TemplateGenerator {
    fn generate(
        &self,
        namespace: &str,
        name: &str,
        parameters: &Parameters,
    ) -> Result<Vec<DecodedObject>> {
        let ctx = RenderContext::new(namespace, name, parameters);
        let artifacts = self.engine.render_all(&self.sources.templates, &ctx)?;

        let mut stream = String::new();
        for artifact in artifacts.iter().filter(|a| !is_partial(&a.path)) {
            let content = artifact.content_str();
            stream.push_str("---\n");
            stream.push_str(&content);
            if !content.ends_with('\n') {
                stream.push('\n');
            }
        }

        let objects = decode_documents(&stream)?;
        ensure_unique(&objects)?;

        tracing::debug!(namespace, name, objects = objects.len(), "generated objects from templates");
        Ok(objects)
    }
}

/// A generator with ordered parameter and object transformer chains
///
/// Attaching a transformer returns a new value; the original is unchanged.
/// Transformers run in attachment order.
#[derive(Clone)]
pub struct TransformableGenerator {
    inner: Arc<dyn Generator>,
    parameter_transformers: Vec<Arc<dyn ParameterTransformer>>,
    object_transformers: Vec<Arc<dyn ObjectTransformer>>,
}

impl TransformableGenerator {
    pub fn new(inner: impl Generator + 'static) -> Self {
        Self::from_arc(Arc::new(inner))
    }

    pub fn from_arc(inner: Arc<dyn Generator>) -> Self {
        Self {
            inner,
            parameter_transformers: Vec::new(),
            object_transformers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_parameter_transformer(
        &self,
        transformer: impl ParameterTransformer + 'static,
    ) -> Self {
        let mut next = self.clone();
        next.parameter_transformers.push(Arc::new(transformer));
        next
    }

    #[must_use]
    pub fn with_object_transformer(&self, transformer: impl ObjectTransformer + 'static) -> Self {
        let mut next = self.clone();
        next.object_transformers.push(Arc::new(transformer));
        next
    }

    pub fn parameter_transformer_count(&self) -> usize {
        self.parameter_transformers.len()
    }

    pub fn object_transformer_count(&self) -> usize {
        self.object_transformers.len()
    }
}

impl Generator for TransformableGenerator {
    fn generate(
        &self,
        namespace: &str,
        name: &str,
        parameters: &Parameters,
    ) -> Result<Vec<DecodedObject>> {
        let mut parameters = parameters.clone();
        for (index, transformer) in self.parameter_transformers.iter().enumerate() {
            parameters = transformer
                .transform_parameters(namespace, name, parameters)
                .map_err(|source| TransformError {
                    stage: TransformStage::Parameters,
                    index,
                    source,
                })?;
        }

        let mut objects = self.inner.generate(namespace, name, &parameters)?;

        for (index, transformer) in self.object_transformers.iter().enumerate() {
            objects = transformer
                .transform_objects(namespace, name, objects)
                .map_err(|source| TransformError {
                    stage: TransformStage::Objects,
                    index,
                    source,
                })?;
        }

        ensure_unique(&objects)?;
        Ok(objects)
    }
}
