//! Error types for cort-kube

use thiserror::Error;

use cort_core::CoreError;
use cort_engine::EngineError;

/// Result type for cort-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Data model violation or parameter failure
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Generation failed
    #[error("generation failed: {0}")]
    Generation(#[from] EngineError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl KubeError {
    /// One-line message for status conditions
    pub fn condition_message(&self) -> String {
        self.to_string().lines().next().unwrap_or_default().to_string()
    }
}
