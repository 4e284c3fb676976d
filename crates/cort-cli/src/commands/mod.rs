//! CLI commands

pub mod plan;
pub mod template;

use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cort_core::{Parameters, parse_set_values};
use cort_engine::{
    DefaultNamespace, Generator, KustomizeGenerator, ObjectStore, TemplateGenerator,
    TransformableGenerator, load_dir,
};

use crate::config::{CortConfig, strip_config};
use crate::error::{CliError, Result};

/// Source directory and parameter flags shared by the commands
#[derive(Args, Debug)]
pub struct SourceArgs {
    /// Source directory holding templates and static files
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Parameter file(s) to merge, in order
    #[arg(short = 'f', long = "values")]
    pub values: Vec<PathBuf>,

    /// Set parameters on the command line (key=value)
    #[arg(long = "set")]
    pub set: Vec<String>,

    /// Deployment namespace
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Deployment name
    #[arg(long)]
    pub name: Option<String>,

    /// Render strictly and decode templates directly, without overlays
    #[arg(long)]
    pub strict: bool,

    /// Only files with this suffix are templates
    #[arg(long)]
    pub suffix: Option<String>,

    /// Configuration file (default: cort.yaml in the source directory)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Everything needed to run the generator once
pub struct Prepared {
    pub generator: TransformableGenerator,
    pub parameters: Parameters,
    pub namespace: String,
    pub name: String,
}

impl SourceArgs {
    pub fn prepare(&self) -> Result<Prepared> {
        if !self.dir.is_dir() {
            return Err(CliError::input_with_help(
                format!("source directory {} not found", self.dir.display()),
                "pass the directory holding the templates",
            ));
        }

        let config = CortConfig::discover(&self.dir, self.config.as_deref())?;
        let suffix = self.suffix.as_deref().unwrap_or(&config.template_suffix);
        let strict = self.strict || config.strict;

        let namespace = self
            .namespace
            .clone()
            .or_else(|| config.namespace.clone())
            .unwrap_or_else(|| "default".to_string());
        let name = match self.name.clone().or_else(|| config.name.clone()) {
            Some(name) => name,
            None => directory_name(&self.dir)?,
        };

        let sources = load_dir(&self.dir, suffix).map_err(|e| CliError::Io {
            message: e.to_string(),
        })?;
        let sources = strip_config(sources, suffix)?;
        tracing::debug!(
            templates = sources.templates.len(),
            statics = sources.statics.len(),
            strict,
            "loaded sources"
        );

        let client = config
            .object_store()?
            .map(|store| Arc::new(store) as Arc<dyn ObjectStore>);

        let inner: Arc<dyn Generator> = if strict {
            Arc::new(TemplateGenerator::new(sources, client))
        } else {
            Arc::new(KustomizeGenerator::new(sources, client))
        };
        let generator = TransformableGenerator::from_arc(inner).with_object_transformer(DefaultNamespace);

        Ok(Prepared {
            generator,
            parameters: self.parameters()?,
            namespace,
            name,
        })
    }

    /// Merge parameter files, then `--set` overrides
    fn parameters(&self) -> Result<Parameters> {
        let mut parameters = Parameters::new();

        for file in &self.values {
            let file_parameters = Parameters::from_file(file).map_err(|e| {
                CliError::input(format!("failed to load parameters {}: {}", file.display(), e))
            })?;
            parameters.merge(&file_parameters);
        }

        if !self.set.is_empty() {
            parameters.merge(&parse_set_values(&self.set)?);
        }

        Ok(parameters)
    }
}

fn directory_name(dir: &Path) -> Result<String> {
    let absolute = dir
        .canonicalize()
        .map_err(|e| CliError::io(dir.display(), e))?;
    absolute
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            CliError::input_with_help(
                "cannot derive a deployment name from the source directory",
                "pass --name",
            )
        })
}
