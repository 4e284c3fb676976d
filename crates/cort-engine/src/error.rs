//! Engine error types with source-mapped template diagnostics

use miette::{Diagnostic, NamedSource, SourceSpan};
use std::fmt;
use thiserror::Error;

use cort_core::{CoreError, TypeInfo};

use crate::suggestions::{
    AVAILABLE_FILTERS, extract_filter_name, extract_function_name, extract_variable_name,
    suggest_iteration_fix, suggest_undefined_variable, suggest_unknown_filter,
    suggest_unknown_function,
};

/// Main engine error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{0}")]
    Template(#[from] TemplateError),

    #[error("overlay composition failed: {0}")]
    Composition(#[from] CompositionError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Fs(#[from] VfsError),

    #[error("object lookup failed: {0}")]
    Lookup(#[from] LookupError),
}

/// Error kind for categorizing template errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TemplateErrorKind {
    UndefinedVariable,
    UnknownFilter,
    UnknownFunction,
    SyntaxError,
    TypeError,
    InvalidOperation,
    Other,
}

impl TemplateErrorKind {
    /// Convert to a code string for diagnostics
    pub fn to_code_string(&self) -> &'static str {
        match self {
            Self::UndefinedVariable => "undefined_variable",
            Self::UnknownFilter => "unknown_filter",
            Self::UnknownFunction => "unknown_function",
            Self::SyntaxError => "syntax",
            Self::TypeError => "type",
            Self::InvalidOperation => "invalid_operation",
            Self::Other => "render",
        }
    }
}

/// Template-specific error with source information
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("{template}{}: {message}", line_suffix(.line))]
#[diagnostic(code(cort::template::render))]
pub struct TemplateError {
    /// Error message
    pub message: String,

    /// Error kind for categorization
    pub kind: TemplateErrorKind,

    /// Name of the failing template
    pub template: String,

    /// 1-based line of the failure, when known
    pub line: Option<usize>,

    /// Template source code
    #[source_code]
    pub src: NamedSource<String>,

    /// Error location in source
    #[label("error occurred here")]
    pub span: Option<SourceSpan>,

    /// Suggestion for fixing the error
    #[help]
    pub suggestion: Option<String>,
}

fn line_suffix(line: &Option<usize>) -> String {
    match line {
        Some(line) => format!(":{}", line),
        None => String::new(),
    }
}

impl TemplateError {
    /// Create a template error from a MiniJinja error
    ///
    /// `parameters` is used to suggest existing keys for undefined variables.
    pub fn from_minijinja(
        err: minijinja::Error,
        template_name: &str,
        template_source: &str,
        parameters: Option<&serde_json::Value>,
    ) -> Self {
        let (kind, message) = categorize_minijinja_error(&err);
        let line = err.line();
        let span = line.and_then(|line_num| calculate_span(template_source, line_num));
        let suggestion = generate_suggestion(&err, &kind, parameters);

        Self {
            message,
            kind,
            template: template_name.to_string(),
            line,
            src: NamedSource::new(template_name, template_source.to_string()),
            span,
            suggestion,
        }
    }

    /// Create a simple error without source mapping
    pub fn simple(template_name: &str, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: TemplateErrorKind::Other,
            template: template_name.to_string(),
            line: None,
            src: NamedSource::new(template_name, String::new()),
            span: None,
            suggestion: None,
        }
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn kind(&self) -> TemplateErrorKind {
        self.kind
    }
}

/// Categorize a MiniJinja error into our error kinds
fn categorize_minijinja_error(err: &minijinja::Error) -> (TemplateErrorKind, String) {
    let msg = err.detail().map(str::to_string).unwrap_or_else(|| err.to_string());
    let msg_lower = msg.to_lowercase();
    let detailed = format!("{:#}", err);

    let kind = match err.kind() {
        minijinja::ErrorKind::UndefinedError => TemplateErrorKind::UndefinedVariable,
        minijinja::ErrorKind::UnknownFilter => TemplateErrorKind::UnknownFilter,
        minijinja::ErrorKind::UnknownFunction => TemplateErrorKind::UnknownFunction,
        minijinja::ErrorKind::SyntaxError => TemplateErrorKind::SyntaxError,
        minijinja::ErrorKind::InvalidOperation => TemplateErrorKind::InvalidOperation,
        minijinja::ErrorKind::NonPrimitive | minijinja::ErrorKind::NonKey => {
            TemplateErrorKind::TypeError
        }
        _ => {
            if msg_lower.contains("undefined") {
                TemplateErrorKind::UndefinedVariable
            } else if msg_lower.contains("not iterable") || msg_lower.contains("cannot") {
                TemplateErrorKind::TypeError
            } else {
                TemplateErrorKind::Other
            }
        }
    };

    let message = match kind {
        TemplateErrorKind::UndefinedVariable => match extract_expression_from_display(&detailed) {
            Some(expr) => format!("undefined variable `{}`", expr),
            None => "undefined variable".to_string(),
        },
        TemplateErrorKind::UnknownFilter => match extract_filter_from_display(&detailed) {
            Some(filter) => format!("unknown filter `{}`", filter),
            None => err.to_string(),
        },
        _ => msg,
    };

    (kind, message)
}

/// Extract the failing expression from MiniJinja's detailed display
///
/// The error line is marked with `>`:
/// ```text
///    8 >   image: {{ image.tg }}
///      i            ^^^^^^^^ undefined value
/// ```
fn extract_expression_from_display(display: &str) -> Option<String> {
    for line in display.lines() {
        let trimmed = line.trim_start();
        if !(trimmed.contains(" > ") || trimmed.starts_with("> ")) {
            continue;
        }
        if let Some(start) = line.find("{{")
            && let Some(end) = line[start..].find("}}")
        {
            let expr = line[start + 2..start + end].trim();
            let expr = expr.split('|').next().unwrap_or(expr).trim();
            if !expr.is_empty() {
                return Some(expr.to_string());
            }
        }
    }
    None
}

/// Extract the filter name from MiniJinja's detailed display
fn extract_filter_from_display(display: &str) -> Option<String> {
    for line in display.lines() {
        let trimmed = line.trim_start();
        if !(trimmed.contains(" > ") || trimmed.starts_with("> ")) {
            continue;
        }
        if let Some(start) = line.find("{{")
            && let Some(end) = line[start..].find("}}")
        {
            let expr = &line[start + 2..start + end];
            if let Some(pipe) = expr.rfind('|')
                && let Some(name) = expr[pipe + 1..].split(['(', ' ']).find(|s| !s.is_empty())
            {
                return Some(name.to_string());
            }
        }
    }
    None
}

/// Calculate the source span for a given line number
fn calculate_span(source: &str, line_num: usize) -> Option<SourceSpan> {
    let mut offset = 0;

    for (index, line) in source.lines().enumerate() {
        if index + 1 == line_num {
            return Some(SourceSpan::new(offset.into(), line.len()));
        }
        offset += line.len() + 1;
    }

    None
}

/// Generate context-aware suggestions based on error kind
fn generate_suggestion(
    err: &minijinja::Error,
    kind: &TemplateErrorKind,
    parameters: Option<&serde_json::Value>,
) -> Option<String> {
    let msg = err.to_string();
    let detailed = format!("{:#}", err);

    match kind {
        TemplateErrorKind::UndefinedVariable => {
            let var_name = extract_expression_from_display(&detailed)
                .or_else(|| extract_variable_name(&msg))?;

            if let Some(hint) = parameters.and_then(|p| suggest_parameter_path(&var_name, p)) {
                return Some(hint);
            }

            let available = parameters
                .and_then(|v| v.as_object())
                .map(|obj| obj.keys().cloned().collect::<Vec<_>>())
                .unwrap_or_default();

            suggest_undefined_variable(&var_name, &available).or_else(|| {
                Some(format!(
                    "Parameter `{}` is not set. Check spelling or use `| default(\"fallback\")`.",
                    var_name
                ))
            })
        }

        TemplateErrorKind::UnknownFilter => {
            match extract_filter_from_display(&detailed).or_else(|| extract_filter_name(&msg)) {
                Some(name) => suggest_unknown_filter(&name),
                None => Some(format!("Unknown filter. Available: {}", AVAILABLE_FILTERS.join(", "))),
            }
        }

        TemplateErrorKind::UnknownFunction => match extract_function_name(&msg) {
            Some(name) => suggest_unknown_function(&name),
            None => Some("Unknown function. Check the function name and arguments.".to_string()),
        },

        TemplateErrorKind::SyntaxError => Some(
            "Check bracket matching: `{{ }}` for expressions, `{% %}` for statements, `{# #}` for comments"
                .to_string(),
        ),

        TemplateErrorKind::TypeError if msg.to_lowercase().contains("not iterable") => {
            Some(suggest_iteration_fix("object"))
        }

        _ => None,
    }
}

/// Walk a dotted expression through the parameters and suggest keys where it breaks
fn suggest_parameter_path(expr: &str, parameters: &serde_json::Value) -> Option<String> {
    let parts: Vec<&str> = expr.split('.').collect();
    if parts.len() < 2 {
        return None;
    }

    let mut current = parameters;
    let mut valid = Vec::new();

    for part in &parts {
        match current.get(part) {
            Some(next) => {
                valid.push(*part);
                current = next;
            }
            None => {
                let obj = current.as_object()?;
                let available: Vec<&str> = obj.keys().map(String::as_str).collect();
                let prefix = valid.join(".");
                let matches = crate::suggestions::find_closest_matches(
                    part,
                    &available,
                    3,
                    crate::suggestions::SuggestionCategory::Property,
                );

                let qualify = |key: &str| {
                    if prefix.is_empty() {
                        format!("`{}`", key)
                    } else {
                        format!("`{}.{}`", prefix, key)
                    }
                };

                return Some(if matches.is_empty() {
                    format!(
                        "Key `{}` not found. Available keys: {}",
                        part,
                        available.join(", ")
                    )
                } else {
                    let suggestions: Vec<String> = matches.iter().map(|m| qualify(&m.text)).collect();
                    format!("Did you mean {}?", suggestions.join(" or "))
                });
            }
        }
    }

    None
}

/// Virtual filesystem errors
#[derive(Error, Debug)]
pub enum VfsError {
    #[error("invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("file not found: {path}")]
    NotFound { path: String },

    #[error("file is not valid UTF-8: {path}")]
    NotUtf8 { path: String },

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk source directory: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Overlay composition errors
#[derive(Error, Debug)]
pub enum CompositionError {
    #[error("no kustomization file found in '{path}'")]
    RootNotFound { path: String },

    #[error("invalid kustomization '{path}': {message}")]
    InvalidKustomization { path: String, message: String },

    #[error("resource not found: {path}")]
    ResourceNotFound { path: String },

    #[error("kustomization cycle detected at '{path}'")]
    Cycle { path: String },

    #[error("invalid resource '{path}': {message}")]
    InvalidResource { path: String, message: String },

    #[error("patch '{patch}' matches no resource")]
    PatchTargetNotFound { patch: String },

    #[error("invalid patch '{patch}': {message}")]
    InvalidPatch { patch: String, message: String },

    #[error("generator '{name}' failed: {message}")]
    Generator { name: String, message: String },

    #[error(transparent)]
    Fs(#[from] VfsError),
}

/// Stage of the transformer chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformStage {
    Parameters,
    Objects,
}

impl fmt::Display for TransformStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformStage::Parameters => f.write_str("parameter"),
            TransformStage::Objects => f.write_str("object"),
        }
    }
}

/// Boxed error returned by user transformers
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A transformer in the chain failed
#[derive(Error, Debug)]
#[error("{stage} transformer #{index} failed: {source}")]
pub struct TransformError {
    pub stage: TransformStage,
    /// Position in the chain (0-based, attachment order)
    pub index: usize,
    #[source]
    pub source: BoxError,
}

/// Object store lookup errors
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("unknown type {type_info}")]
    UnknownType { type_info: TypeInfo },

    #[error("request failed: {message}")]
    Request { message: String },

    #[error("lookup requires a multi-threaded async runtime: {message}")]
    Runtime { message: String },
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
