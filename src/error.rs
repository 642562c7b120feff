//! Error taxonomy shared by the inventory, vector store, and workflows.
//!
//! Library code returns [`StudioError`] so front-ends can map failures to
//! exit codes and HTTP statuses without string matching. The binary edges
//! still use `anyhow` for one-off context.

use std::path::PathBuf;

/// Errors produced by the Check Studio library.
#[derive(Debug, thiserror::Error)]
pub enum StudioError {
    /// A check under the source tree is missing required metadata fields or
    /// has unreadable metadata. Scans skip the check and aggregate these.
    #[error("malformed check at {path}: {reason}")]
    MalformedCheck { path: PathBuf, reason: String },

    /// `build` was called on a store that already holds an index and
    /// `overwrite` was not set.
    #[error("an index already exists at {path}; pass --overwrite to rebuild it")]
    IndexAlreadyExists { path: PathBuf },

    /// Caller misuse: rejected immediately, no partial effect.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The embedding provider call failed. Not retried internally; the
    /// front-end decides whether to retry.
    #[error("embedding provider error: {0}")]
    EmbeddingProvider(String),

    /// The configured embedding provider/model does not match the one the
    /// index was built with.
    #[error(
        "embedding model mismatch: index was built with {indexed}, config says {configured}; \
         rebuild the index or fix the configuration"
    )]
    EmbeddingModelMismatch { indexed: String, configured: String },

    /// An LLM call inside a workflow step failed, or its output could not
    /// be parsed against the expected schema.
    #[error("generation failed at step '{step}': {message}")]
    GenerationFailed { step: &'static str, message: String },

    /// The persisted index is unreadable. Fatal for the operation.
    #[error("index at {path} is corrupt or unreadable ({reason}); rebuild with build-check-rag")]
    IndexCorrupt { path: PathBuf, reason: String },

    /// Required API key or model configuration is missing or unsupported.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StudioError {
    /// Short machine-readable code used by the API error body.
    pub fn code(&self) -> &'static str {
        match self {
            StudioError::MalformedCheck { .. } => "malformed_check",
            StudioError::IndexAlreadyExists { .. } => "index_already_exists",
            StudioError::InvalidArgument(_) => "invalid_argument",
            StudioError::EmbeddingProvider(_) => "embedding_provider_error",
            StudioError::EmbeddingModelMismatch { .. } => "embedding_model_mismatch",
            StudioError::GenerationFailed { .. } => "generation_failed",
            StudioError::IndexCorrupt { .. } => "index_corrupt",
            StudioError::Configuration(_) => "configuration_error",
            StudioError::Database(_) => "database_error",
            StudioError::Io(_) => "io_error",
        }
    }

    /// The workflow step this error originated from, if any.
    pub fn step(&self) -> Option<&'static str> {
        match self {
            StudioError::GenerationFailed { step, .. } => Some(step),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, StudioError>;
