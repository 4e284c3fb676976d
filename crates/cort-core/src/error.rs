//! Core error types

use thiserror::Error;

use crate::inventory::Phase;
use crate::object::ObjectKey;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid parameters: {message}")]
    InvalidParameters { message: String },

    #[error("failed to decode document {index}: {message}")]
    Decode { index: usize, message: String },

    #[error("invalid object: {message}")]
    InvalidObject { message: String },

    #[error("duplicate object {key} in generated manifests")]
    DuplicateObject { key: ObjectKey },

    #[error("failed to compute digest for {key}: {message}")]
    Digest { key: String, message: String },

    #[error("invalid phase transition for {key}: {event} not allowed in phase {from}")]
    InvalidTransition {
        key: String,
        from: Phase,
        event: String,
    },
}

pub type Result<T> = std::result::Result<T, CoreError>;
