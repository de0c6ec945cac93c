//! Error types for mnemo-memory

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the memory system
#[derive(Debug, Error)]
pub enum MemoryError {
    /// RocksDB error
    #[error("Storage error: {0}")]
    Storage(#[from] rocksdb::Error),

    /// Serialization error (bincode)
    #[error("Serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Model loading error
    #[error("Model error: {0}")]
    Model(String),

    /// Embedding generation error
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// A source file or record could not be parsed
    #[error("Failed to parse {}: {reason}", path.display())]
    SourceParse { path: PathBuf, reason: String },

    /// The embedding gateway or vector store failed
    #[error("Collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),

    /// Another index pass is already running
    #[error("An index pass is already in progress")]
    IndexBusy,

    /// Invalid path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl MemoryError {
    /// Create a model error
    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    /// Create an embedding error
    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    /// Create a source parse error
    pub fn source_parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::SourceParse {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a collaborator error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::CollaboratorUnavailable(msg.into())
    }

    /// Create an invalid path error
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Whether this error came from the embedding gateway or the vector store.
    ///
    /// These abort an index pass; everything else is local to one source.
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(
            self,
            Self::Storage(_)
                | Self::Bincode(_)
                | Self::Model(_)
                | Self::Embedding(_)
                | Self::CollaboratorUnavailable(_)
        )
    }
}

/// Result type for memory operations
pub type Result<T> = std::result::Result<T, MemoryError>;
