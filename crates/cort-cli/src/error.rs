//! CLI error type with exit code handling

use miette::Diagnostic;
use thiserror::Error;

use cort_core::CoreError;
use cort_engine::{EngineError, TemplateError};
use cort_kube::KubeError;

use crate::exit_codes;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Template rendering failed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Template(#[from] TemplateError),

    /// Generation failed after rendering
    #[error("Generation failed: {message}")]
    #[diagnostic(code(cort::cli::generation))]
    Generation { message: String },

    /// Invalid parameters, flags or configuration
    #[error("Invalid input: {message}")]
    #[diagnostic(code(cort::cli::input))]
    Input {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("IO error: {message}")]
    #[diagnostic(code(cort::cli::io))]
    Io { message: String },

    #[error("{message}")]
    #[diagnostic(code(cort::cli::error))]
    Other { message: String },
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Template(_) => exit_codes::TEMPLATE_ERROR,
            CliError::Generation { .. } => exit_codes::GENERATION_ERROR,
            CliError::Input { .. } => exit_codes::USAGE_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }

    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: None,
        }
    }

    pub fn input_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    pub fn io(context: impl std::fmt::Display, err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{}: {}", context, err),
        }
    }
}

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Template(te) => CliError::Template(te),
            other => CliError::Generation {
                message: other.to_string(),
            },
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Io(e) => CliError::Io {
                message: e.to_string(),
            },
            CoreError::YamlParse(_) | CoreError::JsonParse(_) | CoreError::InvalidParameters { .. } => {
                CliError::input(err.to_string())
            }
            other => CliError::Generation {
                message: other.to_string(),
            },
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        match err {
            KubeError::Generation(e) => e.into(),
            KubeError::Core(e) => e.into(),
            other => CliError::Other {
                message: other.to_string(),
            },
        }
    }
}
