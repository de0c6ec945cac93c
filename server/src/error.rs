//! Error types for the Mnemo host.

use mnemo_memory::MemoryError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while hosting the memory layer.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Invalid source pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Directory not found: {0}")]
    MissingDirectory(PathBuf),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ServerError::InvalidArgument(_) | ServerError::MissingDirectory(_) => 2,
            ServerError::Memory(MemoryError::IndexBusy) => 75,
            _ => 1,
        }
    }
}

/// Result type alias for host operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_display_invalid_argument() {
        let err = ServerError::InvalidArgument("--limit must be positive".to_string());
        assert_eq!(err.to_string(), "Invalid argument: --limit must be positive");
    }

    #[test]
    fn test_server_error_display_missing_directory() {
        let path = PathBuf::from("/no/such/dir");
        let err = ServerError::MissingDirectory(path.clone());
        assert_eq!(
            err.to_string(),
            format!("Directory not found: {}", path.display())
        );
    }

    #[test]
    fn test_server_error_from_memory_error() {
        let err: ServerError = MemoryError::IndexBusy.into();
        assert!(matches!(err, ServerError::Memory(MemoryError::IndexBusy)));
        assert!(err.to_string().starts_with("Memory error:"));
    }

    #[test]
    fn test_server_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ServerError = io.into();
        assert!(matches!(err, ServerError::Io(_)));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ServerError::InvalidArgument(String::new()).exit_code(), 2);
        assert_eq!(ServerError::Memory(MemoryError::IndexBusy).exit_code(), 75);
        assert_eq!(
            ServerError::Memory(MemoryError::unavailable("down")).exit_code(),
            1
        );
    }
}
